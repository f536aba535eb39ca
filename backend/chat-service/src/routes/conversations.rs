use crate::{error::AppError, middleware::User, state::AppState};
use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;

use super::parse_id;

#[derive(Debug, Deserialize)]
pub struct OpenConversationRequest {
    pub other_user_id: String,
}

/// POST /conversations
/// Find or create the direct conversation with another user
#[post("/conversations")]
pub async fn open_conversation(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<OpenConversationRequest>,
) -> Result<HttpResponse, AppError> {
    let other_user_id = parse_id(&body.other_user_id, "user")?;
    let opened = state.chat.open_conversation(user.id, other_user_id).await?;

    if opened.created {
        Ok(HttpResponse::Created().json(opened))
    } else {
        Ok(HttpResponse::Ok().json(opened))
    }
}

/// GET /conversations
#[get("/conversations")]
pub async fn list_conversations(
    state: web::Data<AppState>,
    user: User,
) -> Result<HttpResponse, AppError> {
    let conversations = state.chat.list_conversations(user.id).await?;
    Ok(HttpResponse::Ok().json(conversations))
}
