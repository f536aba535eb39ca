//! Persistence contracts for conversations and messages.
//!
//! Two implementations exist: [`postgres`] for deployments and [`memory`] for
//! local development and tests. Both guarantee at most one conversation per
//! participant pair, ascending message order per conversation, and a `seen`
//! flag that only ever goes from false to true.

use crate::error::AppResult;
use crate::models::{Attachment, Conversation, Message};
use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::{InMemoryConversationStore, InMemoryMessageStore};
pub use postgres::{PgConversationStore, PgMessageStore};

/// How many times a lost creation race is retried as a lookup
pub(crate) const MAX_CREATE_ATTEMPTS: usize = 3;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Look up the conversation for `{a, b}` in either order, creating it if needed.
    /// The flag is true when this call created it.
    async fn find_or_create(&self, a: Uuid, b: Uuid) -> AppResult<(Conversation, bool)>;

    async fn get(&self, id: Uuid) -> AppResult<Option<Conversation>>;

    /// Conversations containing `user_id`, most recently updated first
    async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<Conversation>>;

    /// Rewrite the last-message preview and bump `updated_at`
    async fn touch(&self, id: Uuid, last_message: &str) -> AppResult<Conversation>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a new unseen message. Fails with `Validation` when it carries
    /// neither text nor attachments.
    async fn append(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
        attachments: &[Attachment],
    ) -> AppResult<Message>;

    /// Append a message and rewrite its conversation's preview as one unit.
    /// Readers never observe the message without the touch; on failure neither
    /// write remains.
    async fn append_and_touch(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
        attachments: &[Attachment],
        preview: &str,
    ) -> AppResult<Message>;

    /// All messages of a conversation in ascending creation order
    async fn list_by_conversation(&self, conversation_id: Uuid) -> AppResult<Vec<Message>>;

    /// Flip `seen` on every unseen message not written by `except_sender`.
    /// Returns how many messages changed.
    async fn mark_seen(&self, conversation_id: Uuid, except_sender: Uuid) -> AppResult<u64>;

    /// Remove every message of a conversation. The conversation itself stays.
    async fn delete_all(&self, conversation_id: Uuid) -> AppResult<u64>;

    async fn get(&self, message_id: Uuid) -> AppResult<Option<Message>>;

    /// Returns false when the message did not exist
    async fn delete(&self, message_id: Uuid) -> AppResult<bool>;

    /// Unseen messages written by someone other than `reader`, per conversation.
    /// Conversations with nothing unread are absent from the map.
    async fn unread_counts(
        &self,
        conversation_ids: &[Uuid],
        reader: Uuid,
    ) -> AppResult<HashMap<Uuid, u64>>;
}
