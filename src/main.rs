/// Lumen Core - session security and at-rest encryption
///
/// The credential subsystem of the Lumen personal tracking service:
/// password hashing, brute-force defense, refresh-token rotation with
/// reuse detection, token-version revocation, and envelope encryption of
/// note text.

mod account;
mod api;
mod config;
mod context;
mod crypto;
mod db;
mod entries;
mod error;
mod metrics;
mod rate_limit;
mod server;
mod session;

use config::ServerConfig;
use context::AppContext;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lumen_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = ServerConfig::from_env()?;

    tracing::info!(
        version = %config.service.version,
        "Starting Lumen core"
    );

    // Create application context
    let ctx = AppContext::new(config).await?;

    // One-shot sweep of long-expired ledger rows. Recurring cleanup is an
    // external maintenance task; the core runs no scheduler.
    let purged = ctx
        .session_manager
        .purge_expired(chrono::Utc::now() - chrono::Duration::days(30))
        .await?;
    if purged > 0 {
        tracing::info!(purged, "Startup sweep removed expired refresh tokens");
    }

    // Start server
    server::serve(ctx).await?;

    Ok(())
}
