use crate::error::{AppError, AppResult};
use crate::middleware::JwtAuth;
use actix_web::web;
use uuid::Uuid;

pub mod conversations;
pub mod messages;
pub mod wsroute;

/// Mount every chat route. `/ws` authenticates through its `token` query
/// parameter, everything under `/api/v1` through the bearer header.
pub fn configure(cfg: &mut web::ServiceConfig, jwt_secret: &str) {
    let json_config = web::JsonConfig::default()
        .error_handler(|err, _req| AppError::Validation(err.to_string()).into());

    cfg.app_data(json_config)
        .service(wsroute::ws_handler)
        .service(
            web::scope("/api/v1")
                .wrap(JwtAuth::new(jwt_secret))
                .service(conversations::open_conversation)
                .service(conversations::list_conversations)
                .service(messages::send_message)
                .service(messages::fetch_messages)
                .service(messages::delete_history)
                .service(messages::delete_message),
        );
}

/// Path segments are parsed here so malformed ids surface as validation errors.
pub(crate) fn parse_id(raw: &str, what: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::Validation(format!("malformed {what} id '{raw}'")))
}
