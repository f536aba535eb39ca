#![allow(dead_code)]

use async_trait::async_trait;
use chat_service::error::{AppError, AppResult};
use chat_service::models::{Attachment, AttachmentKind, Conversation};
use chat_service::repository::{ConversationStore, InMemoryConversationStore, InMemoryMessageStore};
use chat_service::services::{ChatSessionService, StaticProfileDirectory};
use chat_service::websocket::{DeliveryBus, DeliveryEvent};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub const MAX_LENGTH: usize = 200;

/// Records every publish instead of delivering it.
#[derive(Default)]
pub struct RecordingBus {
    pub published: Mutex<Vec<(Vec<Uuid>, DeliveryEvent)>>,
}

impl RecordingBus {
    pub fn events(&self) -> Vec<(Vec<Uuid>, DeliveryEvent)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryBus for RecordingBus {
    async fn publish(&self, targets: &[Uuid], event: &DeliveryEvent) -> AppResult<usize> {
        self.published
            .lock()
            .unwrap()
            .push((targets.to_vec(), event.clone()));
        Ok(targets.len())
    }
}

/// Every publish fails, as if the transport were down.
pub struct FailingBus;

#[async_trait]
impl DeliveryBus for FailingBus {
    async fn publish(&self, _targets: &[Uuid], _event: &DeliveryEvent) -> AppResult<usize> {
        Err(AppError::Delivery("transport down".into()))
    }
}

/// Conversation store whose `touch` always fails, optionally after a delay.
#[derive(Default)]
pub struct BrokenTouchStore {
    pub inner: InMemoryConversationStore,
    pub delay: Duration,
}

impl BrokenTouchStore {
    pub fn slow(delay: Duration) -> Self {
        Self {
            inner: InMemoryConversationStore::new(),
            delay,
        }
    }
}

#[async_trait]
impl ConversationStore for BrokenTouchStore {
    async fn find_or_create(&self, a: Uuid, b: Uuid) -> AppResult<(Conversation, bool)> {
        self.inner.find_or_create(a, b).await
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        self.inner.get(id).await
    }

    async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<Conversation>> {
        self.inner.list_for_user(user_id).await
    }

    async fn touch(&self, _id: Uuid, _last_message: &str) -> AppResult<Conversation> {
        tokio::time::sleep(self.delay).await;
        Err(AppError::Database("connection reset".into()))
    }
}

pub struct Fixture {
    pub chat: ChatSessionService,
    pub bus: Arc<RecordingBus>,
    pub messages: Arc<InMemoryMessageStore>,
    pub alice: Uuid,
    pub bob: Uuid,
    pub mallory: Uuid,
}

pub fn directory(users: &[(Uuid, &str)]) -> Arc<StaticProfileDirectory> {
    let directory = StaticProfileDirectory::new();
    for (id, name) in users {
        directory.register(*id, name);
    }
    Arc::new(directory)
}

pub fn fixture() -> Fixture {
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let mallory = Uuid::new_v4();
    let bus = Arc::new(RecordingBus::default());
    let conversations: Arc<dyn ConversationStore> = Arc::new(InMemoryConversationStore::new());
    let messages = Arc::new(InMemoryMessageStore::new(conversations.clone()));

    let chat = ChatSessionService::new(
        conversations,
        messages.clone(),
        bus.clone(),
        directory(&[(alice, "Alice"), (bob, "Bob"), (mallory, "Mallory")]),
        MAX_LENGTH,
    );

    Fixture {
        chat,
        bus,
        messages,
        alice,
        bob,
        mallory,
    }
}

/// Service over fresh in-memory stores wired to `conversations`.
pub fn service_with(
    conversations: Arc<dyn ConversationStore>,
    bus: Arc<dyn DeliveryBus>,
    users: &[(Uuid, &str)],
) -> (ChatSessionService, Arc<InMemoryMessageStore>) {
    let messages = Arc::new(InMemoryMessageStore::new(conversations.clone()));
    let chat = ChatSessionService::new(
        conversations,
        messages.clone(),
        bus,
        directory(users),
        MAX_LENGTH,
    );
    (chat, messages)
}

pub fn image(name: &str) -> Attachment {
    Attachment {
        path: format!("/uploads/{name}"),
        name: name.to_string(),
        size: 48_213,
        kind: AttachmentKind::Image,
    }
}
