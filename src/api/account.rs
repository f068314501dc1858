/// Account endpoints: registration, password change, key rotation, deletion
use crate::{
    account::{AccountInfo, ChangePasswordRequest, RegisterRequest, RegisterResponse},
    api::middleware,
    context::AppContext,
    crypto::password,
    error::{CoreError, CoreResult},
};
use axum::{
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};

/// Build account routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/v1/auth/register", post(register))
        .route("/v1/auth/password", post(change_password))
        .route("/v1/account", get(get_account).delete(delete_account))
        .route("/v1/account/rotate-note-key", post(rotate_note_key))
}

/// Account profile endpoint (authenticated)
async fn get_account(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
) -> CoreResult<Json<AccountInfo>> {
    let auth = middleware::require_auth(&ctx, &headers).await?;

    let account = ctx.account_manager.get_account(&auth.account_id).await?;

    Ok(Json(AccountInfo {
        account_id: account.id,
        email: account.email,
        display_name: account.display_name,
        email_confirmed: account.email_confirmed,
    }))
}

/// Register endpoint.
///
/// The response body is identical whether the email was fresh or already
/// registered, so the endpoint cannot be used to enumerate accounts. The
/// typed conflict stays internal.
async fn register(
    State(ctx): State<AppContext>,
    Json(req): Json<RegisterRequest>,
) -> CoreResult<Json<RegisterResponse>> {
    match ctx
        .account_manager
        .create_account(&req.email, &req.password, &req.display_name)
        .await
    {
        Ok(account) => {
            tracing::debug!(account_id = %account.id, "Registration accepted");
        }
        Err(CoreError::Conflict(_)) => {
            tracing::debug!("Registration for an already-registered email");
        }
        Err(e) => return Err(e),
    }

    Ok(Json(RegisterResponse {
        message: "If the address is available, the account has been created".to_string(),
    }))
}

/// Change password endpoint (authenticated).
///
/// Verifies the current password, then sets the new one - which bumps the
/// token version and revokes every refresh token, logging out all devices.
async fn change_password(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<ChangePasswordRequest>,
) -> CoreResult<Json<serde_json::Value>> {
    let auth = middleware::require_auth(&ctx, &headers).await?;

    let account = ctx.account_manager.get_account(&auth.account_id).await?;
    if !password::verify(&account.password_hash, &req.current_password) {
        return Err(CoreError::InvalidCredentials);
    }

    ctx.account_manager
        .set_password(&auth.account_id, &req.new_password)
        .await?;

    Ok(Json(serde_json::json!({})))
}

/// Rotate the note-encryption key version (authenticated)
async fn rotate_note_key(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
) -> CoreResult<Json<serde_json::Value>> {
    let auth = middleware::require_auth(&ctx, &headers).await?;

    let version = ctx.account_manager.rotate_note_key(&auth.account_id).await?;

    Ok(Json(serde_json::json!({ "keyVersion": version })))
}

/// Delete account endpoint (authenticated); cascades tokens and entries
async fn delete_account(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
) -> CoreResult<Json<serde_json::Value>> {
    let auth = middleware::require_auth(&ctx, &headers).await?;

    ctx.account_manager.delete_account(&auth.account_id).await?;

    Ok(Json(serde_json::json!({})))
}
