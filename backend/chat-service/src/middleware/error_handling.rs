use crate::error::AppError;
use actix_web::{http::StatusCode, HttpResponse};
use error_types::{error_codes, error_types as kinds, ErrorResponse};

/// Map domain errors to the shared HTTP error envelope
pub fn map_error(err: &AppError) -> (StatusCode, ErrorResponse) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let (error_type, code) = match err {
        AppError::Validation(_) => (kinds::VALIDATION_ERROR, error_codes::INVALID_REQUEST),
        AppError::Unauthorized => (kinds::AUTHENTICATION_ERROR, error_codes::TOKEN_INVALID),
        AppError::Forbidden => (
            kinds::AUTHORIZATION_ERROR,
            error_codes::NOT_CONVERSATION_MEMBER,
        ),
        AppError::NotFound("message") => (kinds::NOT_FOUND_ERROR, error_codes::MESSAGE_NOT_FOUND),
        AppError::NotFound("user") => (kinds::NOT_FOUND_ERROR, error_codes::USER_NOT_FOUND),
        AppError::NotFound(_) => (
            kinds::NOT_FOUND_ERROR,
            error_codes::CONVERSATION_NOT_FOUND,
        ),
        AppError::Conflict(_) => (kinds::CONFLICT_ERROR, error_codes::CONVERSATION_CONFLICT),
        AppError::Database(_) => (kinds::SERVER_ERROR, error_codes::DATABASE_ERROR),
        AppError::Delivery(_) => (kinds::SERVER_ERROR, error_codes::DELIVERY_ERROR),
        AppError::ServiceUnavailable(_) => (
            kinds::SERVICE_UNAVAILABLE_ERROR,
            error_codes::SERVICE_UNAVAILABLE,
        ),
        AppError::Config(_) | AppError::StartServer(_) | AppError::Internal => {
            (kinds::SERVER_ERROR, error_codes::INTERNAL_SERVER_ERROR)
        }
    };

    // Storage and transport details stay in the logs
    let message = match err {
        AppError::Database(_) | AppError::Delivery(_) | AppError::Config(_) => {
            tracing::error!(error = %err, "request failed with server error");
            "internal server error".to_string()
        }
        _ => err.to_string(),
    };

    let response = ErrorResponse::new(
        status.canonical_reason().unwrap_or("Error"),
        &message,
        status.as_u16(),
        error_type,
        code,
    );

    (status, response)
}

pub fn into_response(err: &AppError) -> HttpResponse {
    let (status, response) = map_error(err);
    HttpResponse::build(status).json(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forbidden_maps_to_member_code() {
        let (status, body) = map_error(&AppError::Forbidden);
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body.code, error_codes::NOT_CONVERSATION_MEMBER);
        assert_eq!(body.error, "Forbidden");
    }

    #[test]
    fn test_not_found_code_depends_on_resource() {
        let (_, body) = map_error(&AppError::NotFound("message"));
        assert_eq!(body.code, error_codes::MESSAGE_NOT_FOUND);
        let (_, body) = map_error(&AppError::NotFound("conversation"));
        assert_eq!(body.code, error_codes::CONVERSATION_NOT_FOUND);
        let (_, body) = map_error(&AppError::NotFound("user"));
        assert_eq!(body.code, error_codes::USER_NOT_FOUND);
    }

    #[test]
    fn test_database_details_are_hidden() {
        let (status, body) = map_error(&AppError::Database("relation messages missing".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.message, "internal server error");
        assert_eq!(body.error_type, kinds::SERVER_ERROR);
    }
}
