//! Shared error handling for API endpoints.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{debug, error};

use crate::tokens::TokenError;

/// Extension trait for concise error mapping on Results.
pub trait ResultExt<T> {
    fn db_err(self, msg: &str) -> Result<T, ApiError>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn db_err(self, msg: &str) -> Result<T, ApiError> {
        self.map_err(|e| ApiError::db_error(msg, e))
    }
}

/// Extension trait mapping controller errors: validation failures become
/// 401, anything else is logged and becomes 500.
pub trait TokenResultExt<T> {
    fn token_err(self, msg: &str) -> Result<T, ApiError>;
}

impl<T> TokenResultExt<T> for Result<T, TokenError> {
    fn token_err(self, msg: &str) -> Result<T, ApiError> {
        self.map_err(|e| match e {
            TokenError::Validation(reason) => {
                debug!(reason = reason.as_str(), "{}", msg);
                ApiError::unauthorized("Invalid or expired credentials")
            }
            other => ApiError::db_error(msg, other),
        })
    }
}

/// API error type with automatic response conversion.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Unauthorized(String),
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn db_error(context: &str, e: impl std::fmt::Display) -> Self {
        error!("{}: {}", context, e);
        Self::Internal("Internal error".into())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

/// Validate a session id (UUID, hyphenated or simple form).
pub fn validate_session_id(id: &str) -> Result<(), ApiError> {
    if id.is_empty() {
        return Err(ApiError::bad_request("Session id cannot be empty"));
    }
    if id.len() > 36 {
        return Err(ApiError::bad_request("Session id is too long"));
    }
    if uuid::Uuid::parse_str(id).is_err() {
        return Err(ApiError::bad_request("Invalid session id format"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::ValidationFailure;

    #[test]
    fn test_token_err_mapping() {
        let validation: Result<(), TokenError> =
            Err(TokenError::Validation(ValidationFailure::Expired));
        assert!(matches!(
            validation.token_err("Exchange failed"),
            Err(ApiError::Unauthorized(_))
        ));

        let store: Result<(), TokenError> = Err(TokenError::Store(sqlx::Error::PoolClosed));
        assert!(matches!(
            store.token_err("Exchange failed"),
            Err(ApiError::Internal(_))
        ));
    }

    #[test]
    fn test_validate_session_id() {
        let id = uuid::Uuid::new_v4();
        assert!(validate_session_id(&id.simple().to_string()).is_ok());
        assert!(validate_session_id(&id.to_string()).is_ok());
        assert!(validate_session_id("").is_err());
        assert!(validate_session_id("not-a-session").is_err());
        assert!(validate_session_id(&"a".repeat(37)).is_err());
    }
}
