/// Unified error types for the Lumen core
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the core
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Unknown email or wrong password - identical externally
    #[error("Invalid identifier or password")]
    InvalidCredentials,

    /// Lockout window is active
    #[error("Account temporarily locked")]
    AccountLocked,

    /// Malformed or unmatched refresh token
    #[error("Invalid token")]
    InvalidToken,

    /// Token past its expiry
    #[error("Token expired")]
    TokenExpired,

    /// Replay of a rotated token - the whole family has been revoked
    #[error("Token reuse detected")]
    TokenReused,

    /// AEAD tag or AAD mismatch on decrypt
    #[error("Integrity check failed: {0}")]
    Integrity(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Conflict errors (e.g., duplicate account)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// JWT errors
    #[error("JWT error: {0}")]
    Jwt(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wire error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Convert CoreError to HTTP response with a stable error code
impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            CoreError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "InvalidCredentials",
                self.to_string(),
            ),
            CoreError::AccountLocked => (
                StatusCode::LOCKED,
                "AccountLocked",
                self.to_string(),
            ),
            CoreError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "InvalidToken",
                self.to_string(),
            ),
            CoreError::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                "TokenExpired",
                self.to_string(),
            ),
            CoreError::TokenReused => (
                StatusCode::UNAUTHORIZED,
                "TokenReused",
                self.to_string(),
            ),
            CoreError::Integrity(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IntegrityError",
                "Stored data failed integrity verification".to_string(), // Don't leak details
            ),
            CoreError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                self.to_string(),
            ),
            CoreError::Conflict(_) => (
                StatusCode::CONFLICT,
                "Conflict",
                self.to_string(),
            ),
            CoreError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                "NotFound",
                self.to_string(),
            ),
            CoreError::RateLimitExceeded { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RateLimitExceeded",
                "Rate limit exceeded".to_string(),
            ),
            CoreError::Database(_)
            | CoreError::Internal(_)
            | CoreError::Io(_)
            | CoreError::Jwt(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "Internal server error".to_string(), // Don't leak details
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;
