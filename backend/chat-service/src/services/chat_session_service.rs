//! # Chat Session Service
//!
//! The single entry point for 1:1 chat operations. Wraps the conversation
//! and message stores plus the delivery bus.
//!
//! ## Send path
//!
//! Participation is checked before the payload is validated, so outsiders see
//! `Forbidden` whatever they send. The message append and the conversation
//! touch are one store operation ([`MessageStore::append_and_touch`]) run on a
//! detached task, so a dropped request cannot stop it halfway. Publishing
//! happens only after that unit succeeded, and a failed publish is logged and
//! swallowed: clients reconcile through [`ChatSessionService::fetch_messages`].
//!
//! ## Seen receipts
//!
//! Bulk only. Fetching a conversation marks every unseen message from the
//! counterpart as seen and notifies the counterpart once.

use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::message::{summary, validate_outgoing};
use crate::models::{
    Attachment, Conversation, ConversationState, ConversationSummary, Message, MessageView,
    ParticipantProfile,
};
use crate::repository::{ConversationStore, MessageStore};
use crate::services::profile_directory::ProfileDirectory;
use crate::websocket::{DeliveryBus, DeliveryEvent};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Identity lookups in flight while building a conversation list
const PROFILE_LOOKUP_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Serialize)]
pub struct OpenedConversation {
    pub conversation_id: Uuid,
    pub other_participant: ParticipantProfile,
    pub last_message: Option<String>,
    pub state: ConversationState,
    /// True when this call created the conversation
    pub created: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationHistory {
    pub conversation_id: Uuid,
    pub other_participant: ParticipantProfile,
    pub messages: Vec<MessageView>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct DeletedHistory {
    pub deleted_count: u64,
}

#[derive(Clone)]
pub struct ChatSessionService {
    conversations: Arc<dyn ConversationStore>,
    messages: Arc<dyn MessageStore>,
    bus: Arc<dyn DeliveryBus>,
    profiles: Arc<dyn ProfileDirectory>,
    max_message_length: usize,
}

impl ChatSessionService {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        messages: Arc<dyn MessageStore>,
        bus: Arc<dyn DeliveryBus>,
        profiles: Arc<dyn ProfileDirectory>,
        max_message_length: usize,
    ) -> Self {
        Self {
            conversations,
            messages,
            bus,
            profiles,
            max_message_length,
        }
    }

    /// Find or lazily create the direct conversation between `user_id` and `other_user_id`.
    pub async fn open_conversation(
        &self,
        user_id: Uuid,
        other_user_id: Uuid,
    ) -> AppResult<OpenedConversation> {
        if user_id == other_user_id {
            return Err(AppError::Validation(
                "cannot open a conversation with yourself".into(),
            ));
        }

        let other_participant = self.profiles.profile(other_user_id).await?;
        let (conversation, created) = self
            .conversations
            .find_or_create(user_id, other_user_id)
            .await?;

        if created {
            metrics::record_conversation_created();
            info!(
                conversation_id = %conversation.id,
                user_id = %user_id,
                other_user_id = %other_user_id,
                "conversation created"
            );
        }

        Ok(OpenedConversation {
            conversation_id: conversation.id,
            other_participant,
            state: conversation.state(),
            last_message: conversation.last_message,
            created,
        })
    }

    /// Conversations of `user_id`, most recently updated first.
    pub async fn list_conversations(&self, user_id: Uuid) -> AppResult<Vec<ConversationSummary>> {
        let conversations = self.conversations.list_for_user(user_id).await?;
        let ids: Vec<Uuid> = conversations.iter().map(|c| c.id).collect();
        let unread = self.messages.unread_counts(&ids, user_id).await?;
        let unread = &unread;

        stream::iter(conversations)
            .map(|conversation| async move {
                let other_id = conversation
                    .other_participant(user_id)
                    .ok_or(AppError::Internal)?;
                Ok::<_, AppError>(ConversationSummary {
                    conversation_id: conversation.id,
                    other_participant: self.profile_or_unknown(other_id).await,
                    state: conversation.state(),
                    unread_count: unread.get(&conversation.id).copied().unwrap_or(0),
                    last_message: conversation.last_message,
                    updated_at: conversation.updated_at,
                })
            })
            .buffered(PROFILE_LOOKUP_CONCURRENCY)
            .try_collect()
            .await
    }

    pub async fn send_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: String,
        attachments: Vec<Attachment>,
    ) -> AppResult<MessageView> {
        let conversation = self.participant_conversation(conversation_id, sender_id).await?;
        validate_outgoing(&content, &attachments, self.max_message_length)?;

        let service = self.clone();
        tokio::spawn(async move {
            service
                .persist_and_deliver(conversation, sender_id, content, attachments)
                .await
        })
        .await
        .map_err(|e| {
            error!(conversation_id = %conversation_id, error = %e, "send task aborted");
            AppError::Internal
        })?
    }

    async fn persist_and_deliver(
        &self,
        conversation: Conversation,
        sender_id: Uuid,
        content: String,
        attachments: Vec<Attachment>,
    ) -> AppResult<MessageView> {
        let preview = summary(&content, &attachments);
        let message = self
            .messages
            .append_and_touch(conversation.id, sender_id, &content, &attachments, &preview)
            .await
            .map_err(|e| {
                error!(
                    conversation_id = %conversation.id,
                    sender_id = %sender_id,
                    error = %e,
                    "message not persisted"
                );
                e
            })?;
        metrics::record_message_sent();

        let view = MessageView {
            sender: self.profile_or_unknown(sender_id).await,
            message,
        };
        let event = DeliveryEvent::NewMessage {
            conversation_id: conversation.id,
            message: view.clone(),
        };
        self.deliver(&conversation.participants, &event).await;

        Ok(view)
    }

    /// Message history in send order.
    ///
    /// Marks the counterpart's unseen messages as seen first, so the
    /// returned history already reflects the read.
    pub async fn fetch_messages(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<ConversationHistory> {
        let conversation = self.participant_conversation(conversation_id, user_id).await?;
        let other_id = conversation
            .other_participant(user_id)
            .ok_or(AppError::Internal)?;

        let seen = self.messages.mark_seen(conversation_id, user_id).await?;
        if seen > 0 {
            metrics::record_messages_seen(seen);
            let event = DeliveryEvent::MessagesSeen {
                conversation_id,
                seen_by: user_id,
                count: seen,
            };
            self.deliver(&[other_id], &event).await;
        }

        let messages = self.messages.list_by_conversation(conversation_id).await?;
        let me = self.profile_or_unknown(user_id).await;
        let other_participant = self.profile_or_unknown(other_id).await;

        let messages = messages
            .into_iter()
            .map(|message| with_sender(message, &me, &other_participant))
            .collect();

        Ok(ConversationHistory {
            conversation_id,
            other_participant,
            messages,
        })
    }

    /// Remove every message; the conversation itself stays.
    pub async fn delete_history(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<DeletedHistory> {
        self.participant_conversation(conversation_id, user_id).await?;
        let deleted_count = self.messages.delete_all(conversation_id).await?;
        info!(
            conversation_id = %conversation_id,
            user_id = %user_id,
            deleted_count,
            "conversation history deleted"
        );
        Ok(DeletedHistory { deleted_count })
    }

    /// Delete one of the caller's own messages.
    pub async fn delete_message(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<()> {
        self.participant_conversation(conversation_id, user_id).await?;

        let message = self
            .messages
            .get(message_id)
            .await?
            .filter(|m| m.conversation_id == conversation_id)
            .ok_or(AppError::NotFound("message"))?;

        if message.sender_id != user_id {
            warn!(
                conversation_id = %conversation_id,
                message_id = %message_id,
                user_id = %user_id,
                "attempt to delete another participant's message"
            );
            return Err(AppError::Forbidden);
        }

        if !self.messages.delete(message_id).await? {
            return Err(AppError::NotFound("message"));
        }
        info!(conversation_id = %conversation_id, message_id = %message_id, "message deleted");
        Ok(())
    }

    async fn participant_conversation(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Conversation> {
        let conversation = self
            .conversations
            .get(conversation_id)
            .await?
            .ok_or(AppError::NotFound("conversation"))?;

        if !conversation.is_participant(user_id) {
            warn!(
                conversation_id = %conversation_id,
                user_id = %user_id,
                "non-participant tried to access conversation"
            );
            return Err(AppError::Forbidden);
        }
        Ok(conversation)
    }

    async fn profile_or_unknown(&self, user_id: Uuid) -> ParticipantProfile {
        match self.profiles.profile(user_id).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "profile lookup failed, using placeholder");
                ParticipantProfile::unknown(user_id)
            }
        }
    }

    async fn deliver(&self, targets: &[Uuid], event: &DeliveryEvent) {
        if let Err(e) = self.bus.publish(targets, event).await {
            error!(
                conversation_id = %event.conversation_id(),
                event = event.kind(),
                error = %e,
                "delivery failed, clients will reconcile on fetch"
            );
            metrics::record_delivery_failure(event.kind());
        }
    }
}

fn with_sender(message: Message, me: &ParticipantProfile, other: &ParticipantProfile) -> MessageView {
    let sender = if message.sender_id == me.user_id {
        me.clone()
    } else if message.sender_id == other.user_id {
        other.clone()
    } else {
        ParticipantProfile::unknown(message.sender_id)
    };
    MessageView { message, sender }
}
