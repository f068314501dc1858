/// Application context and dependency injection
use crate::{
    account::AccountManager,
    config::ServerConfig,
    crypto::envelope::EnvelopeService,
    db,
    entries::EntryStore,
    error::CoreResult,
    rate_limit::{RateLimitConfig, RateLimiter},
    session::SessionManager,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub account_manager: Arc<AccountManager>,
    pub session_manager: Arc<SessionManager>,
    pub entry_store: Arc<EntryStore>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> CoreResult<Self> {
        config.validate()?;

        let db = db::create_pool(&config.storage.core_db, db::DatabaseOptions::default()).await?;
        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        let config = Arc::new(config);

        let account_manager = Arc::new(AccountManager::new(db.clone(), Arc::clone(&config)));
        let session_manager = Arc::new(SessionManager::new(db.clone(), Arc::clone(&config)));

        let envelope = Arc::new(EnvelopeService::new(config.master_key()?));
        let entry_store = Arc::new(EntryStore::new(db.clone(), envelope));

        let rate_limiter = Arc::new(RateLimiter::new(RateLimitConfig::from(&config.rate_limit)));

        Ok(Self {
            config,
            db,
            account_manager,
            session_manager,
            entry_store,
            rate_limiter,
        })
    }
}
