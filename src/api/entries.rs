/// Entry endpoints: the encrypted-note surface
use crate::{
    api::middleware,
    context::AppContext,
    entries::{EntryInput, EntryView},
    error::CoreResult,
};
use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

/// Build entry routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/v1/entries", post(create_entry).get(list_entries))
        .route(
            "/v1/entries/:id",
            get(get_entry).put(update_entry).delete(delete_entry),
        )
}

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<i64>,
}

/// Create entry; the note is encrypted before it reaches storage
async fn create_entry(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(input): Json<EntryInput>,
) -> CoreResult<Json<EntryView>> {
    let auth = middleware::require_auth(&ctx, &headers).await?;

    let entry = ctx.entry_store.create_entry(&auth.account_id, input).await?;

    Ok(Json(entry))
}

/// List recent entries with notes decrypted
async fn list_entries(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> CoreResult<Json<Vec<EntryView>>> {
    let auth = middleware::require_auth(&ctx, &headers).await?;

    let entries = ctx
        .entry_store
        .list_entries(&auth.account_id, params.limit.unwrap_or(50))
        .await?;

    Ok(Json(entries))
}

/// Get one entry
async fn get_entry(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> CoreResult<Json<EntryView>> {
    let auth = middleware::require_auth(&ctx, &headers).await?;

    let entry = ctx.entry_store.get_entry(&auth.account_id, &id).await?;

    Ok(Json(entry))
}

/// Replace an entry (the note blob is rewritten in full)
async fn update_entry(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<EntryInput>,
) -> CoreResult<Json<EntryView>> {
    let auth = middleware::require_auth(&ctx, &headers).await?;

    let entry = ctx
        .entry_store
        .update_entry(&auth.account_id, &id, input)
        .await?;

    Ok(Json(entry))
}

/// Delete an entry
async fn delete_entry(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> CoreResult<Json<serde_json::Value>> {
    let auth = middleware::require_auth(&ctx, &headers).await?;

    ctx.entry_store.delete_entry(&auth.account_id, &id).await?;

    Ok(Json(serde_json::json!({})))
}
