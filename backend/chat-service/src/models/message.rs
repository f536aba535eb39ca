use super::profile::ParticipantProfile;
use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Coarse media type recorded for an attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Video,
    Audio,
    Document,
}

impl AttachmentKind {
    /// Classify a MIME type such as `image/png`. Anything unrecognised is a document.
    pub fn from_mime(mime: &str) -> Self {
        let top_level = mime
            .split('/')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match top_level.as_str() {
            "image" => AttachmentKind::Image,
            "video" => AttachmentKind::Video,
            "audio" => AttachmentKind::Audio,
            _ => AttachmentKind::Document,
        }
    }
}

impl fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AttachmentKind::Image => "image",
            AttachmentKind::Video => "video",
            AttachmentKind::Audio => "audio",
            AttachmentKind::Document => "document",
        };
        f.write_str(label)
    }
}

/// File reference produced by the attachment store. Size is in bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub path: String,
    pub name: String,
    pub size: u64,
    pub kind: AttachmentKind,
}

impl Attachment {
    fn validate(&self) -> Result<(), AppError> {
        if self.path.trim().is_empty() {
            return Err(AppError::Validation("attachment path is required".into()));
        }
        if self.name.trim().is_empty() {
            return Err(AppError::Validation("attachment name is required".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub seen: bool,
    /// Per-conversation insertion order, breaks ties between equal timestamps
    pub sequence_number: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A message enriched with its sender's display fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    pub sender: ParticipantProfile,
}

/// Reject messages that carry nothing, or too much text.
pub fn validate_outgoing(
    content: &str,
    attachments: &[Attachment],
    max_length: usize,
) -> Result<(), AppError> {
    if content.trim().is_empty() && attachments.is_empty() {
        return Err(AppError::Validation(
            "message must have content or at least one attachment".into(),
        ));
    }
    let length = content.chars().count();
    if length > max_length {
        return Err(AppError::Validation(format!(
            "message content is {length} characters, limit is {max_length}"
        )));
    }
    attachments.iter().try_for_each(Attachment::validate)
}

/// Preview text stored on the conversation after a send
pub fn summary(content: &str, attachments: &[Attachment]) -> String {
    match attachments.first() {
        Some(first) if content.trim().is_empty() => format!("[{}] {}", first.kind, first.name),
        _ => content.to_string(),
    }
}
