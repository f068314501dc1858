/// Session endpoints: login, refresh, logout, logout-all, device listing
use crate::{
    api::middleware,
    context::AppContext,
    error::CoreResult,
    session::{LoginRequest, LogoutRequest, RefreshRequest, SessionListResponse, SessionTokens},
};
use axum::{
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};

/// Build session routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/v1/auth/login", post(login))
        .route("/v1/auth/refresh", post(refresh))
        .route("/v1/auth/logout", post(logout))
        .route("/v1/auth/logout-all", post(logout_all))
        .route("/v1/auth/sessions", get(list_sessions))
}

/// Login endpoint: brute-force guard, credential check, new token family
async fn login(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> CoreResult<Json<SessionTokens>> {
    let net = middleware::network_meta(&headers);

    let account = ctx
        .account_manager
        .verify_login(&req.email, &req.password)
        .await?;

    let tokens = ctx
        .session_manager
        .create_session(&account, &req.device, &net)
        .await?;

    Ok(Json(tokens))
}

/// Refresh endpoint: single-use rotation with reuse detection
async fn refresh(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<RefreshRequest>,
) -> CoreResult<Json<SessionTokens>> {
    let net = middleware::network_meta(&headers);

    let tokens = ctx.session_manager.rotate(&req.refresh_token, &net).await?;

    Ok(Json(tokens))
}

/// Logout endpoint (single device). Idempotent by design.
async fn logout(
    State(ctx): State<AppContext>,
    Json(req): Json<LogoutRequest>,
) -> CoreResult<Json<serde_json::Value>> {
    ctx.session_manager.revoke(&req.refresh_token).await?;

    Ok(Json(serde_json::json!({})))
}

/// Logout-everywhere endpoint (authenticated)
async fn logout_all(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
) -> CoreResult<Json<serde_json::Value>> {
    let auth = middleware::require_auth(&ctx, &headers).await?;

    ctx.session_manager.revoke_all(&auth.account_id).await?;

    Ok(Json(serde_json::json!({})))
}

/// List active sessions for the device-management screen (authenticated)
async fn list_sessions(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
) -> CoreResult<Json<SessionListResponse>> {
    let auth = middleware::require_auth(&ctx, &headers).await?;

    let sessions = ctx.session_manager.active_sessions(&auth.account_id).await?;

    Ok(Json(SessionListResponse { sessions }))
}
