/// Authentication middleware and request metadata extraction
use crate::{
    context::AppContext,
    error::{CoreError, CoreResult},
    session::{NetworkMeta, ValidatedAccess},
};
use axum::http::HeaderMap;

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

/// Require authentication - verify the access token or return 401.
///
/// Every call re-checks the account's current token version in storage; a
/// token minted before a logout-all or password change fails here even
/// inside its nominal expiry.
pub async fn require_auth(ctx: &AppContext, headers: &HeaderMap) -> CoreResult<ValidatedAccess> {
    let token = extract_bearer_token(headers).ok_or(CoreError::InvalidToken)?;
    ctx.session_manager.verify_access(&token).await
}

/// Network metadata from request headers. Raw values are hashed before
/// storage; this struct only carries them to that boundary.
pub fn network_meta(headers: &HeaderMap) -> NetworkMeta {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let user_agent = headers
        .get("user-agent")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty());

    NetworkMeta { ip, user_agent }
}
