//! In-process stores backed by `tokio::sync::RwLock`-guarded maps.

use super::{ConversationStore, MessageStore};
use crate::error::{AppError, AppResult};
use crate::models::message::validate_outgoing;
use crate::models::{Attachment, Conversation, Message, ParticipantPair};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct ConversationTables {
    by_id: HashMap<Uuid, Conversation>,
    by_pair: HashMap<ParticipantPair, Uuid>,
}

#[derive(Default, Clone)]
pub struct InMemoryConversationStore {
    inner: Arc<RwLock<ConversationTables>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn find_or_create(&self, a: Uuid, b: Uuid) -> AppResult<(Conversation, bool)> {
        let pair = ParticipantPair::new(a, b).ok_or_else(|| {
            AppError::Validation("a conversation needs two distinct participants".into())
        })?;

        {
            let guard = self.inner.read().await;
            if let Some(existing) = guard.by_pair.get(&pair).and_then(|id| guard.by_id.get(id)) {
                return Ok((existing.clone(), false));
            }
        }

        // Re-check under the write lock: another caller may have created it meanwhile
        let mut guard = self.inner.write().await;
        if let Some(existing) = guard.by_pair.get(&pair).and_then(|id| guard.by_id.get(id)) {
            return Ok((existing.clone(), false));
        }

        let conversation = Conversation::new(pair);
        guard.by_pair.insert(pair, conversation.id);
        guard.by_id.insert(conversation.id, conversation.clone());
        Ok((conversation, true))
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        Ok(self.inner.read().await.by_id.get(&id).cloned())
    }

    async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<Conversation>> {
        let guard = self.inner.read().await;
        let mut conversations: Vec<Conversation> = guard
            .by_id
            .values()
            .filter(|c| c.is_participant(user_id))
            .cloned()
            .collect();
        conversations.sort_by(|x, y| y.updated_at.cmp(&x.updated_at));
        Ok(conversations)
    }

    async fn touch(&self, id: Uuid, last_message: &str) -> AppResult<Conversation> {
        let mut guard = self.inner.write().await;
        let conversation = guard
            .by_id
            .get_mut(&id)
            .ok_or(AppError::NotFound("conversation"))?;
        conversation.last_message = Some(last_message.to_string());
        conversation.updated_at = Utc::now().max(conversation.updated_at);
        Ok(conversation.clone())
    }
}

#[derive(Default)]
struct ConversationLog {
    last_seq: i64,
    last_created_at: Option<DateTime<Utc>>,
    messages: Vec<Message>,
}

#[derive(Default)]
struct MessageTables {
    logs: HashMap<Uuid, ConversationLog>,
    /// message id -> conversation id
    index: HashMap<Uuid, Uuid>,
}

impl MessageTables {
    fn push(
        &mut self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
        attachments: &[Attachment],
    ) -> Message {
        let log = self.logs.entry(conversation_id).or_default();

        // Timestamps never go backwards within a conversation
        let now = Utc::now();
        let created_at = match log.last_created_at {
            Some(last) if last > now => last,
            _ => now,
        };
        log.last_seq += 1;
        log.last_created_at = Some(created_at);

        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            content: content.to_string(),
            attachments: attachments.to_vec(),
            seen: false,
            sequence_number: log.last_seq,
            created_at,
            updated_at: created_at,
        };
        log.messages.push(message.clone());
        self.index.insert(message.id, conversation_id);
        message
    }

    /// Undo the latest `push`, restoring the counters it advanced.
    fn pop(&mut self, message: &Message, previous_created_at: Option<DateTime<Utc>>) {
        self.index.remove(&message.id);
        if let Some(log) = self.logs.get_mut(&message.conversation_id) {
            log.messages.retain(|m| m.id != message.id);
            log.last_seq = message.sequence_number - 1;
            log.last_created_at = previous_created_at;
        }
    }
}

/// Message store keeping each conversation's log in insertion order.
///
/// Plain appends do not check that the conversation exists; pair them with a
/// conversation store lookup (the session service does) to get `NotFound`
/// semantics. `append_and_touch` goes through `conversations` and fails when
/// the touch does.
#[derive(Clone)]
pub struct InMemoryMessageStore {
    inner: Arc<RwLock<MessageTables>>,
    conversations: Arc<dyn ConversationStore>,
}

impl InMemoryMessageStore {
    pub fn new(conversations: Arc<dyn ConversationStore>) -> Self {
        Self {
            inner: Arc::default(),
            conversations,
        }
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn append(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
        attachments: &[Attachment],
    ) -> AppResult<Message> {
        validate_outgoing(content, attachments, usize::MAX)?;
        let mut guard = self.inner.write().await;
        Ok(guard.push(conversation_id, sender_id, content, attachments))
    }

    async fn append_and_touch(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
        attachments: &[Attachment],
        preview: &str,
    ) -> AppResult<Message> {
        validate_outgoing(content, attachments, usize::MAX)?;

        // The write lock spans the touch: readers wait until both writes
        // landed or the append was undone.
        let mut guard = self.inner.write().await;
        let previous_created_at = guard
            .logs
            .get(&conversation_id)
            .and_then(|log| log.last_created_at);
        let message = guard.push(conversation_id, sender_id, content, attachments);

        if let Err(e) = self.conversations.touch(conversation_id, preview).await {
            guard.pop(&message, previous_created_at);
            return Err(e);
        }
        Ok(message)
    }

    async fn list_by_conversation(&self, conversation_id: Uuid) -> AppResult<Vec<Message>> {
        let guard = self.inner.read().await;
        Ok(guard
            .logs
            .get(&conversation_id)
            .map(|log| log.messages.clone())
            .unwrap_or_default())
    }

    async fn mark_seen(&self, conversation_id: Uuid, except_sender: Uuid) -> AppResult<u64> {
        let mut guard = self.inner.write().await;
        let Some(log) = guard.logs.get_mut(&conversation_id) else {
            return Ok(0);
        };

        let now = Utc::now();
        let mut changed = 0;
        for message in log
            .messages
            .iter_mut()
            .filter(|m| !m.seen && m.sender_id != except_sender)
        {
            message.seen = true;
            message.updated_at = now;
            changed += 1;
        }
        Ok(changed)
    }

    async fn delete_all(&self, conversation_id: Uuid) -> AppResult<u64> {
        let mut guard = self.inner.write().await;
        let removed: Vec<Uuid> = match guard.logs.get_mut(&conversation_id) {
            Some(log) => log.messages.drain(..).map(|m| m.id).collect(),
            None => return Ok(0),
        };
        for id in &removed {
            guard.index.remove(id);
        }
        Ok(removed.len() as u64)
    }

    async fn get(&self, message_id: Uuid) -> AppResult<Option<Message>> {
        let guard = self.inner.read().await;
        Ok(guard
            .index
            .get(&message_id)
            .and_then(|conversation_id| guard.logs.get(conversation_id))
            .and_then(|log| log.messages.iter().find(|m| m.id == message_id))
            .cloned())
    }

    async fn delete(&self, message_id: Uuid) -> AppResult<bool> {
        let mut guard = self.inner.write().await;
        let Some(conversation_id) = guard.index.remove(&message_id) else {
            return Ok(false);
        };
        if let Some(log) = guard.logs.get_mut(&conversation_id) {
            log.messages.retain(|m| m.id != message_id);
        }
        Ok(true)
    }

    async fn unread_counts(
        &self,
        conversation_ids: &[Uuid],
        reader: Uuid,
    ) -> AppResult<HashMap<Uuid, u64>> {
        let guard = self.inner.read().await;
        Ok(conversation_ids
            .iter()
            .filter_map(|id| {
                let unread = guard
                    .logs
                    .get(id)?
                    .messages
                    .iter()
                    .filter(|m| !m.seen && m.sender_id != reader)
                    .count() as u64;
                (unread > 0).then_some((*id, unread))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AttachmentKind;

    fn message_store() -> InMemoryMessageStore {
        InMemoryMessageStore::new(Arc::new(InMemoryConversationStore::new()))
    }

    #[tokio::test]
    async fn test_find_or_create_is_symmetric() {
        let store = InMemoryConversationStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let (first, created) = store.find_or_create(a, b).await.unwrap();
        let (second, created_again) = store.find_or_create(b, a).await.unwrap();

        assert!(created);
        assert!(!created_again);
        assert_eq!(first.id, second.id);
        assert_eq!(store.list_for_user(a).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_find_or_create_rejects_same_user() {
        let store = InMemoryConversationStore::new();
        let a = Uuid::new_v4();
        assert!(matches!(
            store.find_or_create(a, a).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_touch_missing_conversation() {
        let store = InMemoryConversationStore::new();
        assert!(matches!(
            store.touch(Uuid::new_v4(), "hi").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_for_user_orders_by_recent_update() {
        let store = InMemoryConversationStore::new();
        let me = Uuid::new_v4();
        let (older, _) = store.find_or_create(me, Uuid::new_v4()).await.unwrap();
        let (newer, _) = store.find_or_create(me, Uuid::new_v4()).await.unwrap();
        store.find_or_create(Uuid::new_v4(), Uuid::new_v4()).await.unwrap();

        store.touch(newer.id, "first").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        store.touch(older.id, "second").await.unwrap();

        let listed = store.list_for_user(me).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, older.id);
        assert_eq!(listed[0].last_message.as_deref(), Some("second"));
        assert_eq!(listed[1].id, newer.id);
    }

    #[tokio::test]
    async fn test_append_assigns_increasing_sequence() {
        let store = message_store();
        let conversation_id = Uuid::new_v4();
        let sender = Uuid::new_v4();

        let first = store.append(conversation_id, sender, "one", &[]).await.unwrap();
        let second = store.append(conversation_id, sender, "two", &[]).await.unwrap();

        assert!(!first.seen);
        assert_eq!(first.sequence_number + 1, second.sequence_number);
        assert!(first.created_at <= second.created_at);
    }

    #[tokio::test]
    async fn test_append_requires_payload() {
        let store = message_store();
        let result = store.append(Uuid::new_v4(), Uuid::new_v4(), "", &[]).await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let file = Attachment {
            path: "/uploads/a.ogg".into(),
            name: "a.ogg".into(),
            size: 10,
            kind: AttachmentKind::Audio,
        };
        assert!(store
            .append(Uuid::new_v4(), Uuid::new_v4(), "", &[file])
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_mark_seen_skips_own_messages_and_is_idempotent() {
        let store = message_store();
        let conversation_id = Uuid::new_v4();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        store.append(conversation_id, alice, "hi bob", &[]).await.unwrap();
        store.append(conversation_id, bob, "hi alice", &[]).await.unwrap();

        let unread = store.unread_counts(&[conversation_id], bob).await.unwrap();
        assert_eq!(unread.get(&conversation_id), Some(&1));
        assert_eq!(store.mark_seen(conversation_id, bob).await.unwrap(), 1);
        assert_eq!(store.mark_seen(conversation_id, bob).await.unwrap(), 0);
        assert!(store
            .unread_counts(&[conversation_id], bob)
            .await
            .unwrap()
            .is_empty());

        let messages = store.list_by_conversation(conversation_id).await.unwrap();
        assert!(messages[0].seen);
        assert!(!messages[1].seen);
    }

    #[tokio::test]
    async fn test_delete_all_keeps_sequence_monotonic() {
        let store = message_store();
        let conversation_id = Uuid::new_v4();
        let sender = Uuid::new_v4();

        let before = store.append(conversation_id, sender, "a", &[]).await.unwrap();
        store.append(conversation_id, sender, "b", &[]).await.unwrap();

        assert_eq!(store.delete_all(conversation_id).await.unwrap(), 2);
        assert!(store.get(before.id).await.unwrap().is_none());
        assert!(store.list_by_conversation(conversation_id).await.unwrap().is_empty());

        let after = store.append(conversation_id, sender, "c", &[]).await.unwrap();
        assert!(after.sequence_number > before.sequence_number);
    }

    #[tokio::test]
    async fn test_delete_single_message() {
        let store = message_store();
        let conversation_id = Uuid::new_v4();
        let sender = Uuid::new_v4();
        let keep = store.append(conversation_id, sender, "keep", &[]).await.unwrap();
        let drop = store.append(conversation_id, sender, "drop", &[]).await.unwrap();

        assert!(store.delete(drop.id).await.unwrap());
        assert!(!store.delete(drop.id).await.unwrap());

        let remaining = store.list_by_conversation(conversation_id).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, keep.id);
    }

    #[tokio::test]
    async fn test_unread_counts_cover_several_conversations() {
        let store = message_store();
        let reader = Uuid::new_v4();
        let friend = Uuid::new_v4();
        let busy = Uuid::new_v4();
        let quiet = Uuid::new_v4();
        let mine_only = Uuid::new_v4();

        for text in ["a", "b", "c"] {
            store.append(busy, friend, text, &[]).await.unwrap();
        }
        store.append(quiet, friend, "d", &[]).await.unwrap();
        store.mark_seen(quiet, reader).await.unwrap();
        store.append(mine_only, reader, "e", &[]).await.unwrap();

        let unread = store
            .unread_counts(&[busy, quiet, mine_only, Uuid::new_v4()], reader)
            .await
            .unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[&busy], 3);
    }

    #[tokio::test]
    async fn test_append_and_touch_updates_the_conversation() {
        let conversations = InMemoryConversationStore::new();
        let store = InMemoryMessageStore::new(Arc::new(conversations.clone()));
        let a = Uuid::new_v4();
        let (conversation, _) = conversations.find_or_create(a, Uuid::new_v4()).await.unwrap();

        let message = store
            .append_and_touch(conversation.id, a, "hello", &[], "hello")
            .await
            .unwrap();

        let touched = conversations.get(conversation.id).await.unwrap().unwrap();
        assert_eq!(touched.last_message.as_deref(), Some("hello"));
        assert_eq!(message.sequence_number, 1);
    }

    #[tokio::test]
    async fn test_append_and_touch_undoes_the_append_on_missing_conversation() {
        let store = message_store();
        let conversation_id = Uuid::new_v4();
        let sender = Uuid::new_v4();

        let result = store
            .append_and_touch(conversation_id, sender, "orphan", &[], "orphan")
            .await;

        assert!(matches!(result, Err(AppError::NotFound("conversation"))));
        assert!(store.list_by_conversation(conversation_id).await.unwrap().is_empty());

        // The failed attempt does not burn a sequence number
        let next = store.append(conversation_id, sender, "next", &[]).await.unwrap();
        assert_eq!(next.sequence_number, 1);
    }
}
