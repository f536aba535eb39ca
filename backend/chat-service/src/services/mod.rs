pub mod chat_session_service;
pub mod profile_directory;

pub use chat_session_service::{
    ChatSessionService, ConversationHistory, DeletedHistory, OpenedConversation,
};
pub use profile_directory::{HttpProfileDirectory, ProfileDirectory, StaticProfileDirectory};
