/// Refresh-token rotation engine
///
/// State machine per token row: active -> rotated (superseded, kept for
/// audit) on use, or -> family-revoked on reuse detection, with implicit
/// expiry once `expires_at` passes. Within a family at most one row is ever
/// unrevoked - the current credential of that lineage.
///
/// SQLite has no `SELECT ... FOR UPDATE`, so the rotate transaction opens
/// with a guarded compare-and-swap UPDATE. That first write acquires the
/// database writer lock, serializing concurrent rotations of the same row:
/// the loser observes zero affected rows plus the winner's committed
/// `revoked = 1` and takes the reuse path, revoking the entire family.

use crate::{
    config::ServerConfig,
    crypto::token,
    db::models::{Account, RefreshTokenRecord},
    error::{CoreError, CoreResult},
    metrics,
    session::{
        access::AccessTokenIssuer, DeviceMeta, NetworkMeta, SessionInfo, SessionTokens,
        ValidatedAccess,
    },
};
use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::sync::Arc;
use uuid::Uuid;

/// Random bytes per refresh-token secret (64 hex chars on the wire)
const SECRET_BYTES: usize = 32;

const TOKEN_COLUMNS: &str = "id, account_id, token_hash, family_id, revoked, expires_at, \
                             device_id, device_name, ip_hash, user_agent_hash, \
                             last_used_at, created_at";

/// Session manager service
#[derive(Clone)]
pub struct SessionManager {
    db: SqlitePool,
    config: Arc<ServerConfig>,
    access: AccessTokenIssuer,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(db: SqlitePool, config: Arc<ServerConfig>) -> Self {
        let access = AccessTokenIssuer::new(&config);
        Self { db, config, access }
    }

    /// Start a new token family for a freshly verified login
    pub async fn create_session(
        &self,
        account: &Account,
        device: &DeviceMeta,
        net: &NetworkMeta,
    ) -> CoreResult<SessionTokens> {
        let family_id = Uuid::new_v4().to_string();

        let mut tx = self.db.begin().await.map_err(CoreError::Database)?;
        let refresh_token = self
            .insert_token(
                &mut tx,
                &account.id,
                &family_id,
                device.device_id.as_deref(),
                device.device_name.as_deref(),
                net.ip.as_deref().map(token::sha256_hex),
                net.user_agent.as_deref().map(token::sha256_hex),
            )
            .await?;
        let access_token = self
            .access
            .issue(&account.id, &account.email, account.token_version)?;
        tx.commit().await.map_err(CoreError::Database)?;

        tracing::debug!(account_id = %account.id, family_id = %family_id, "Session created");

        Ok(SessionTokens {
            access_token,
            refresh_token,
        })
    }

    /// Rotate a refresh token: revoke the presented row, issue its successor
    /// in the same family, and mint a fresh access token - all in one
    /// transaction.
    pub async fn rotate(&self, raw_token: &str, net: &NetworkMeta) -> CoreResult<SessionTokens> {
        // Malformed input never reaches storage
        let (record_id, secret) =
            token::decode_refresh_token(raw_token).ok_or(CoreError::InvalidToken)?;
        let secret_hash = token::sha256_hex(&secret);
        let now = Utc::now();

        let mut tx = self.db.begin().await.map_err(CoreError::Database)?;

        // Compare-and-swap claim. The sole healthy path is exactly one
        // affected row; the expiry predicate keeps expired tokens untouched
        // so their replay classifies as expired, not reused.
        let claimed = sqlx::query(
            "UPDATE refresh_token SET revoked = 1, last_used_at = ?1
             WHERE id = ?2 AND token_hash = ?3 AND revoked = 0 AND expires_at > ?1",
        )
        .bind(now)
        .bind(&record_id)
        .bind(&secret_hash)
        .execute(&mut *tx)
        .await
        .map_err(CoreError::Database)?
        .rows_affected();

        if claimed == 0 {
            return self
                .classify_failed_claim(tx, &record_id, &secret_hash)
                .await;
        }

        let row = self.fetch_token(&mut tx, &record_id).await?.ok_or_else(|| {
            // Claimed a row that then vanished; treat as unmatched
            CoreError::InvalidToken
        })?;

        let account_row = sqlx::query("SELECT email, token_version FROM account WHERE id = ?1")
            .bind(&row.account_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(CoreError::Database)?
            .ok_or(CoreError::InvalidToken)?;
        let email: String = account_row.get("email");
        let token_version: i64 = account_row.get("token_version");

        // Successor inherits device identity; network hashes refresh when
        // the caller provided new values.
        let ip_hash = net
            .ip
            .as_deref()
            .map(token::sha256_hex)
            .or_else(|| row.ip_hash.clone());
        let user_agent_hash = net
            .user_agent
            .as_deref()
            .map(token::sha256_hex)
            .or_else(|| row.user_agent_hash.clone());

        let refresh_token = self
            .insert_token(
                &mut tx,
                &row.account_id,
                &row.family_id,
                row.device_id.as_deref(),
                row.device_name.as_deref(),
                ip_hash,
                user_agent_hash,
            )
            .await?;

        let access_token = self.access.issue(&row.account_id, &email, token_version)?;

        tx.commit().await.map_err(CoreError::Database)?;
        metrics::TOKEN_ROTATIONS_TOTAL.inc();

        Ok(SessionTokens {
            access_token,
            refresh_token,
        })
    }

    /// Decide why the claim failed: unmatched, reused, or expired.
    ///
    /// Runs inside the same transaction, after the claim statement already
    /// holds the writer lock, so the state it reads is settled.
    async fn classify_failed_claim(
        &self,
        mut tx: Transaction<'_, Sqlite>,
        record_id: &str,
        secret_hash: &str,
    ) -> CoreResult<SessionTokens> {
        let row = self.fetch_token(&mut tx, record_id).await?;

        let Some(row) = row else {
            tx.rollback().await.map_err(CoreError::Database)?;
            return Err(CoreError::InvalidToken);
        };
        if row.token_hash != secret_hash {
            tx.rollback().await.map_err(CoreError::Database)?;
            return Err(CoreError::InvalidToken);
        }

        if row.revoked {
            // A token that was already rotated away is being presented
            // again: stolen-and-replayed, or a client retry that lost a
            // race. Either way the whole lineage dies.
            let killed = sqlx::query(
                "UPDATE refresh_token SET revoked = 1 WHERE family_id = ?1 AND revoked = 0",
            )
            .bind(&row.family_id)
            .execute(&mut *tx)
            .await
            .map_err(CoreError::Database)?
            .rows_affected();

            tx.commit().await.map_err(CoreError::Database)?;

            metrics::TOKEN_REUSE_TOTAL.inc();
            if killed > 0 {
                metrics::FAMILY_REVOCATIONS_TOTAL.inc();
            }
            tracing::warn!(
                account_id = %row.account_id,
                family_id = %row.family_id,
                siblings_revoked = killed,
                "Refresh token reuse detected, family revoked"
            );
            return Err(CoreError::TokenReused);
        }

        if row.is_expired(Utc::now()) {
            // Plain expiry is not a breach signal - no family action, and
            // the row itself was left untouched by the claim.
            tx.rollback().await.map_err(CoreError::Database)?;
            return Err(CoreError::TokenExpired);
        }

        tx.rollback().await.map_err(CoreError::Database)?;
        Err(CoreError::InvalidToken)
    }

    /// Revoke one token (single-device logout). Idempotent: malformed,
    /// unknown, or already-revoked tokens are not an error.
    pub async fn revoke(&self, raw_token: &str) -> CoreResult<()> {
        let Some((record_id, secret)) = token::decode_refresh_token(raw_token) else {
            return Ok(());
        };

        sqlx::query("UPDATE refresh_token SET revoked = 1 WHERE id = ?1 AND token_hash = ?2")
            .bind(&record_id)
            .bind(token::sha256_hex(&secret))
            .execute(&self.db)
            .await
            .map_err(CoreError::Database)?;

        Ok(())
    }

    /// Revoke every live refresh token for the account and bump its token
    /// version, killing issued access tokens as well ("log out everywhere").
    pub async fn revoke_all(&self, account_id: &str) -> CoreResult<()> {
        let mut tx = self.db.begin().await.map_err(CoreError::Database)?;

        sqlx::query("UPDATE refresh_token SET revoked = 1 WHERE account_id = ?1 AND revoked = 0")
            .bind(account_id)
            .execute(&mut *tx)
            .await
            .map_err(CoreError::Database)?;

        let bumped = sqlx::query("UPDATE account SET token_version = token_version + 1 WHERE id = ?1")
            .bind(account_id)
            .execute(&mut *tx)
            .await
            .map_err(CoreError::Database)?
            .rows_affected();

        if bumped == 0 {
            return Err(CoreError::NotFound("Account not found".to_string()));
        }

        tx.commit().await.map_err(CoreError::Database)?;

        tracing::info!(account_id = %account_id, "All sessions revoked");
        Ok(())
    }

    /// Verify an access token. Signature and claims first, then the
    /// account's current token version is re-read from storage - never
    /// cached - so revocation is immediately and globally visible.
    pub async fn verify_access(&self, signed_token: &str) -> CoreResult<ValidatedAccess> {
        let claims = self.access.decode(signed_token)?;

        let current: Option<i64> =
            sqlx::query_scalar("SELECT token_version FROM account WHERE id = ?1")
                .bind(&claims.sub)
                .fetch_optional(&self.db)
                .await
                .map_err(CoreError::Database)?;

        match current {
            Some(version) if version == claims.tv => Ok(ValidatedAccess {
                account_id: claims.sub,
                email: claims.email,
            }),
            _ => Err(CoreError::InvalidToken),
        }
    }

    /// Live sessions for the device-management screen
    pub async fn active_sessions(&self, account_id: &str) -> CoreResult<Vec<SessionInfo>> {
        let rows = sqlx::query_as::<_, RefreshTokenRecord>(&format!(
            "SELECT {} FROM refresh_token
             WHERE account_id = ?1 AND revoked = 0 AND expires_at > ?2
             ORDER BY created_at DESC",
            TOKEN_COLUMNS
        ))
        .bind(account_id)
        .bind(Utc::now())
        .fetch_all(&self.db)
        .await
        .map_err(CoreError::Database)?;

        Ok(rows
            .into_iter()
            .map(|r| SessionInfo {
                id: r.id,
                device_id: r.device_id,
                device_name: r.device_name,
                created_at: r.created_at,
                last_used_at: r.last_used_at,
                expires_at: r.expires_at,
            })
            .collect())
    }

    /// Delete ledger rows past their natural expiry. Invoked by an external
    /// maintenance task; the core schedules nothing itself.
    pub async fn purge_expired(&self, before: DateTime<Utc>) -> CoreResult<u64> {
        let deleted = sqlx::query("DELETE FROM refresh_token WHERE expires_at < ?1")
            .bind(before)
            .execute(&self.db)
            .await
            .map_err(CoreError::Database)?
            .rows_affected();

        if deleted > 0 {
            tracing::info!(deleted, "Purged expired refresh tokens");
        }
        Ok(deleted)
    }

    /// Insert a fresh ledger row and return the encoded opaque token. Only
    /// the secret's hash is stored.
    #[allow(clippy::too_many_arguments)]
    async fn insert_token(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        account_id: &str,
        family_id: &str,
        device_id: Option<&str>,
        device_name: Option<&str>,
        ip_hash: Option<String>,
        user_agent_hash: Option<String>,
    ) -> CoreResult<String> {
        let id = Uuid::new_v4().to_string();
        let secret = token::random_secret(SECRET_BYTES);
        let now = Utc::now();
        let expires_at = now + Duration::days(self.config.authentication.refresh_ttl_days);

        sqlx::query(
            "INSERT INTO refresh_token (id, account_id, token_hash, family_id, revoked,
                                        expires_at, device_id, device_name, ip_hash,
                                        user_agent_hash, last_used_at, created_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?7, ?8, ?9, NULL, ?10)",
        )
        .bind(&id)
        .bind(account_id)
        .bind(token::sha256_hex(&secret))
        .bind(family_id)
        .bind(expires_at)
        .bind(device_id)
        .bind(device_name)
        .bind(ip_hash)
        .bind(user_agent_hash)
        .bind(now)
        .execute(&mut **tx)
        .await
        .map_err(CoreError::Database)?;

        Ok(token::encode_refresh_token(&id, &secret))
    }

    async fn fetch_token(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        record_id: &str,
    ) -> CoreResult<Option<RefreshTokenRecord>> {
        sqlx::query_as::<_, RefreshTokenRecord>(&format!(
            "SELECT {} FROM refresh_token WHERE id = ?1",
            TOKEN_COLUMNS
        ))
        .bind(record_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(CoreError::Database)
    }
}
