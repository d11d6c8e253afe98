use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Top-level error surface shared by every cell. Domain errors
/// (queue, schedule, reminder) convert into these variants at the
/// handler boundary via `From` impls.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    /// Malformed input data, e.g. a national id that is not 16 digits.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Illegal state changes, e.g. canceling a finished queue or
    /// admitting past an exhausted quota.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    /// Upstream gateway failures (WhatsApp messaging API).
    #[error("External service error: {0}")]
    ExternalService(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Auth(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Database(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::ExternalService(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        tracing::error!("Error: {}: {}", status, message);

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_map_to_expected_status_codes() {
        let cases = [
            (AppError::Auth("no token".into()), StatusCode::UNAUTHORIZED),
            (AppError::NotFound("queue 9".into()), StatusCode::NOT_FOUND),
            (AppError::BadRequest("past date".into()), StatusCode::BAD_REQUEST),
            (
                AppError::ValidationError("National id must be exactly 16 digits".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::Conflict("Cannot transition from finished to canceled".into()),
                StatusCode::CONFLICT,
            ),
            (
                AppError::Database("connection reset".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                AppError::ExternalService("gateway timeout".into()),
                StatusCode::BAD_GATEWAY,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
