use crate::{
    error::AppError,
    middleware::User,
    models::{Attachment, AttachmentKind},
    state::AppState,
};
use actix_web::{delete, get, post, web, HttpResponse};
use serde::Deserialize;

use super::parse_id;

/// Attachment metadata as returned by the upload service.
/// `kind` may be omitted when `mime` is present.
#[derive(Debug, Deserialize)]
pub struct AttachmentInput {
    pub path: String,
    pub name: String,
    pub size: u64,
    #[serde(default)]
    pub kind: Option<AttachmentKind>,
    #[serde(default)]
    pub mime: Option<String>,
}

impl From<AttachmentInput> for Attachment {
    fn from(input: AttachmentInput) -> Self {
        let kind = input.kind.unwrap_or_else(|| {
            input
                .mime
                .as_deref()
                .map(AttachmentKind::from_mime)
                .unwrap_or(AttachmentKind::Document)
        });
        Attachment {
            path: input.path,
            name: input.name,
            size: input.size,
            kind,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentInput>,
}

/// POST /conversations/{id}/messages
#[post("/conversations/{id}/messages")]
pub async fn send_message(
    state: web::Data<AppState>,
    path: web::Path<String>,
    user: User,
    body: web::Json<SendMessageRequest>,
) -> Result<HttpResponse, AppError> {
    let conversation_id = parse_id(&path, "conversation")?;
    let SendMessageRequest {
        content,
        attachments,
    } = body.into_inner();

    let attachments = attachments.into_iter().map(Attachment::from).collect();

    let message = state
        .chat
        .send_message(conversation_id, user.id, content, attachments)
        .await?;
    Ok(HttpResponse::Created().json(message))
}

/// GET /conversations/{id}/messages
/// Returns the full history and marks the counterpart's messages as seen
#[get("/conversations/{id}/messages")]
pub async fn fetch_messages(
    state: web::Data<AppState>,
    path: web::Path<String>,
    user: User,
) -> Result<HttpResponse, AppError> {
    let conversation_id = parse_id(&path, "conversation")?;
    let history = state.chat.fetch_messages(conversation_id, user.id).await?;
    Ok(HttpResponse::Ok().json(history))
}

/// DELETE /conversations/{id}/messages
#[delete("/conversations/{id}/messages")]
pub async fn delete_history(
    state: web::Data<AppState>,
    path: web::Path<String>,
    user: User,
) -> Result<HttpResponse, AppError> {
    let conversation_id = parse_id(&path, "conversation")?;
    let deleted = state.chat.delete_history(conversation_id, user.id).await?;
    Ok(HttpResponse::Ok().json(deleted))
}

/// DELETE /conversations/{id}/messages/{message_id}
#[delete("/conversations/{id}/messages/{message_id}")]
pub async fn delete_message(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    user: User,
) -> Result<HttpResponse, AppError> {
    let (raw_conversation, raw_message) = path.into_inner();
    let conversation_id = parse_id(&raw_conversation, "conversation")?;
    let message_id = parse_id(&raw_message, "message")?;

    state
        .chat
        .delete_message(conversation_id, message_id, user.id)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}
