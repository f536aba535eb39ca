pub mod conversation;
pub mod message;
pub mod profile;

pub use conversation::{Conversation, ConversationState, ConversationSummary, ParticipantPair};
pub use message::{Attachment, AttachmentKind, Message, MessageView};
pub use profile::ParticipantProfile;
