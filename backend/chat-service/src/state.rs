use crate::{
    config::Config,
    repository::{ConversationStore, InMemoryConversationStore, InMemoryMessageStore},
    services::{ChatSessionService, ProfileDirectory},
    websocket::ConnectionRegistry,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub chat: ChatSessionService,
    /// Local WebSocket connections; the Redis listener also feeds it
    pub registry: ConnectionRegistry,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(chat: ChatSessionService, registry: ConnectionRegistry, config: Config) -> Self {
        Self {
            chat,
            registry,
            config: Arc::new(config),
        }
    }

    /// Single-instance wiring: in-memory stores, delivery through the local registry.
    pub fn in_memory(config: Config, profiles: Arc<dyn ProfileDirectory>) -> Self {
        let registry = ConnectionRegistry::new();
        let conversations: Arc<dyn ConversationStore> = Arc::new(InMemoryConversationStore::new());
        let chat = ChatSessionService::new(
            conversations.clone(),
            Arc::new(InMemoryMessageStore::new(conversations)),
            Arc::new(registry.clone()),
            profiles,
            config.max_message_length,
        );
        Self::new(chat, registry, config)
    }
}
