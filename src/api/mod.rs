/// API routes and handlers
pub mod account;
pub mod entries;
pub mod middleware;
pub mod session;

use crate::context::AppContext;
use axum::Router;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(account::routes())
        .merge(session::routes())
        .merge(entries::routes())
}
