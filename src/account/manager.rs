/// Account manager using sqlx runtime queries
///
/// Owns the credential side of the account row: registration, password
/// verification behind the brute-force guard, password changes (which
/// invalidate every session), and note-encryption key rotation.

use crate::{
    account::lockout::{self, LockoutPolicy},
    config::ServerConfig,
    crypto::password,
    db::models::Account,
    error::{CoreError, CoreResult},
    metrics,
};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;
use validator::ValidateEmail;

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;

/// Account manager service
pub struct AccountManager {
    db: SqlitePool,
    policy: LockoutPolicy,
}

impl AccountManager {
    /// Create a new account manager
    pub fn new(db: SqlitePool, config: Arc<ServerConfig>) -> Self {
        let policy = LockoutPolicy::from_config(&config.lockout);
        Self { db, policy }
    }

    /// Create a new account
    pub async fn create_account(
        &self,
        email: &str,
        password_plain: &str,
        display_name: &str,
    ) -> CoreResult<Account> {
        let email = normalize_email(email);
        validate_email(&email)?;
        validate_password(password_plain)?;

        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(CoreError::Validation("Display name cannot be empty".to_string()));
        }

        if self.email_exists(&email).await? {
            return Err(CoreError::Conflict("Email already registered".to_string()));
        }

        let password_hash = password::hash(password_plain)?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO account (id, email, display_name, password_hash, token_version,
                                  failed_login_attempts, locked_until, encryption_key_version,
                                  email_confirmed, created_at)
             VALUES (?1, ?2, ?3, ?4, 0, 0, NULL, 1, 0, ?5)",
        )
        .bind(&id)
        .bind(&email)
        .bind(display_name)
        .bind(&password_hash)
        .bind(now)
        .execute(&self.db)
        .await
        .map_err(CoreError::Database)?;

        tracing::info!(account_id = %id, "Account created");

        Ok(Account {
            id,
            email,
            display_name: display_name.to_string(),
            password_hash,
            token_version: 0,
            failed_login_attempts: 0,
            locked_until: None,
            encryption_key_version: 1,
            email_confirmed: false,
            created_at: now,
        })
    }

    /// Verify login credentials behind the brute-force guard.
    ///
    /// Order: lockout check (fail fast, no password work), progressive
    /// delay, password verification, then counter reset or increment. An
    /// unknown email burns a dummy verification so its latency matches a
    /// wrong-password attempt and returns the same generic error.
    pub async fn verify_login(&self, email: &str, password_plain: &str) -> CoreResult<Account> {
        let email = normalize_email(email);

        let Some(account) = self.find_by_email(&email).await? else {
            password::verify_dummy();
            metrics::LOGIN_FAILURE_TOTAL.inc();
            return Err(CoreError::InvalidCredentials);
        };

        let now = Utc::now();
        if let Some(locked_until) = account.locked_until {
            if locked_until > now {
                metrics::LOCKED_REJECTIONS_TOTAL.inc();
                tracing::warn!(account_id = %account.id, "Login rejected: lockout window active");
                return Err(CoreError::AccountLocked);
            }
        }

        // Primary throttle: synchronous progressive delay indexed by the
        // failure counter, independent of the outer rate limiter.
        let delay = lockout::delay_for(account.failed_login_attempts);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if password::verify(&account.password_hash, password_plain) {
            self.record_success(&account.id).await?;
            metrics::LOGIN_SUCCESS_TOTAL.inc();

            let mut account = account;
            account.failed_login_attempts = 0;
            account.locked_until = None;
            Ok(account)
        } else {
            self.record_failure(&account).await?;
            metrics::LOGIN_FAILURE_TOTAL.inc();
            Err(CoreError::InvalidCredentials)
        }
    }

    /// Zero the failure counter and clear the lockout in one statement
    async fn record_success(&self, account_id: &str) -> CoreResult<()> {
        sqlx::query(
            "UPDATE account SET failed_login_attempts = 0, locked_until = NULL WHERE id = ?1",
        )
        .bind(account_id)
        .execute(&self.db)
        .await
        .map_err(CoreError::Database)?;

        Ok(())
    }

    /// Increment the failure counter, applying the hard lockout at the
    /// threshold. The increment happens in SQL so concurrent failures
    /// cannot lose updates.
    async fn record_failure(&self, account: &Account) -> CoreResult<()> {
        let locked_until = Utc::now() + self.policy.lockout_window;

        sqlx::query(
            "UPDATE account
             SET failed_login_attempts = failed_login_attempts + 1,
                 locked_until = CASE
                     WHEN failed_login_attempts + 1 >= ?1 THEN ?2
                     ELSE locked_until
                 END
             WHERE id = ?3",
        )
        .bind(self.policy.max_attempts)
        .bind(locked_until)
        .bind(&account.id)
        .execute(&self.db)
        .await
        .map_err(CoreError::Database)?;

        if self.policy.locks_at(account.failed_login_attempts + 1) {
            metrics::LOCKOUTS_TOTAL.inc();
            tracing::warn!(account_id = %account.id, "Account locked after repeated failures");
        }

        Ok(())
    }

    /// Get account by id
    pub async fn get_account(&self, account_id: &str) -> CoreResult<Account> {
        sqlx::query_as::<_, Account>(
            "SELECT id, email, display_name, password_hash, token_version,
                    failed_login_attempts, locked_until, encryption_key_version,
                    email_confirmed, created_at
             FROM account WHERE id = ?1",
        )
        .bind(account_id)
        .fetch_optional(&self.db)
        .await
        .map_err(CoreError::Database)?
        .ok_or_else(|| CoreError::NotFound("Account not found".to_string()))
    }

    /// Find account by normalized email
    pub async fn find_by_email(&self, email: &str) -> CoreResult<Option<Account>> {
        sqlx::query_as::<_, Account>(
            "SELECT id, email, display_name, password_hash, token_version,
                    failed_login_attempts, locked_until, encryption_key_version,
                    email_confirmed, created_at
             FROM account WHERE email = ?1",
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .map_err(CoreError::Database)
    }

    /// Check if an email is already registered
    async fn email_exists(&self, email: &str) -> CoreResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM account WHERE email = ?1")
            .bind(email)
            .fetch_one(&self.db)
            .await
            .map_err(CoreError::Database)?;

        Ok(count > 0)
    }

    /// Set a new password and invalidate every existing session.
    ///
    /// The hash update, the token-version bump (which kills issued access
    /// tokens), and the refresh-token ledger revocation commit together or
    /// not at all.
    pub async fn set_password(&self, account_id: &str, new_password: &str) -> CoreResult<()> {
        validate_password(new_password)?;
        let password_hash = password::hash(new_password)?;

        let mut tx = self.db.begin().await.map_err(CoreError::Database)?;

        let updated = sqlx::query(
            "UPDATE account
             SET password_hash = ?1,
                 token_version = token_version + 1,
                 failed_login_attempts = 0,
                 locked_until = NULL
             WHERE id = ?2",
        )
        .bind(&password_hash)
        .bind(account_id)
        .execute(&mut *tx)
        .await
        .map_err(CoreError::Database)?
        .rows_affected();

        if updated == 0 {
            return Err(CoreError::NotFound("Account not found".to_string()));
        }

        sqlx::query("UPDATE refresh_token SET revoked = 1 WHERE account_id = ?1 AND revoked = 0")
            .bind(account_id)
            .execute(&mut *tx)
            .await
            .map_err(CoreError::Database)?;

        tx.commit().await.map_err(CoreError::Database)?;

        tracing::info!(account_id = %account_id, "Password changed, all sessions invalidated");
        Ok(())
    }

    /// Bump the note-encryption key version.
    ///
    /// New ciphertext uses the returned version; existing blobs keep
    /// decrypting under the version stored beside them.
    pub async fn rotate_note_key(&self, account_id: &str) -> CoreResult<i64> {
        let version: Option<i64> = sqlx::query_scalar(
            "UPDATE account SET encryption_key_version = encryption_key_version + 1
             WHERE id = ?1
             RETURNING encryption_key_version",
        )
        .bind(account_id)
        .fetch_optional(&self.db)
        .await
        .map_err(CoreError::Database)?;

        let version = version.ok_or_else(|| CoreError::NotFound("Account not found".to_string()))?;

        tracing::info!(account_id = %account_id, key_version = version, "Note key rotated");
        Ok(version)
    }

    /// Delete the account. Refresh tokens and entries cascade.
    pub async fn delete_account(&self, account_id: &str) -> CoreResult<()> {
        let deleted = sqlx::query("DELETE FROM account WHERE id = ?1")
            .bind(account_id)
            .execute(&self.db)
            .await
            .map_err(CoreError::Database)?
            .rows_affected();

        if deleted == 0 {
            return Err(CoreError::NotFound("Account not found".to_string()));
        }

        tracing::info!(account_id = %account_id, "Account deleted");
        Ok(())
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> CoreResult<()> {
    if !email.validate_email() {
        return Err(CoreError::Validation("Invalid email address".to_string()));
    }
    Ok(())
}

fn validate_password(password: &str) -> CoreResult<()> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(CoreError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(CoreError::Validation(format!(
            "Password must be at most {} characters",
            MAX_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::db::test_pool;

    async fn manager() -> AccountManager {
        AccountManager::new(test_pool().await, Arc::new(test_config()))
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let mgr = manager().await;
        let account = mgr
            .create_account("Casey@Example.com", "a strong passphrase", "Casey")
            .await
            .unwrap();

        // Email is normalized at registration and lookup
        assert_eq!(account.email, "casey@example.com");

        let logged_in = mgr
            .verify_login("CASEY@example.com", "a strong passphrase")
            .await
            .unwrap();
        assert_eq!(logged_in.id, account.id);
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let mgr = manager().await;
        mgr.create_account("dup@example.com", "a strong passphrase", "One")
            .await
            .unwrap();

        let err = mgr
            .create_account("DUP@example.com", "another passphrase", "Two")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_rejects_bad_registration_input() {
        let mgr = manager().await;

        assert!(matches!(
            mgr.create_account("not-an-email", "a strong passphrase", "X").await,
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            mgr.create_account("ok@example.com", "short", "X").await,
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            mgr.create_account("ok@example.com", "a strong passphrase", "   ").await,
            Err(CoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_email_is_generic_invalid_credentials() {
        let mgr = manager().await;
        let err = mgr
            .verify_login("nobody@example.com", "whatever12")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_wrong_password_increments_counter() {
        let mgr = manager().await;
        let account = mgr
            .create_account("count@example.com", "a strong passphrase", "C")
            .await
            .unwrap();

        let err = mgr
            .verify_login("count@example.com", "wrong password")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidCredentials));

        let account = mgr.get_account(&account.id).await.unwrap();
        assert_eq!(account.failed_login_attempts, 1);
        assert!(account.locked_until.is_none());
    }

    #[tokio::test]
    async fn test_lockout_at_threshold_even_with_correct_password() {
        let mgr = manager().await;
        let account = mgr
            .create_account("lock@example.com", "a strong passphrase", "L")
            .await
            .unwrap();

        // test_config threshold is 3
        for _ in 0..3 {
            let _ = mgr.verify_login("lock@example.com", "wrong password").await;
        }

        let row = mgr.get_account(&account.id).await.unwrap();
        assert_eq!(row.failed_login_attempts, 3);
        assert!(row.locked_until.is_some());

        let err = mgr
            .verify_login("lock@example.com", "a strong passphrase")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::AccountLocked));
    }

    #[tokio::test]
    async fn test_login_succeeds_after_lockout_window_and_resets_counter() {
        let mgr = manager().await;
        let account = mgr
            .create_account("expire@example.com", "a strong passphrase", "E")
            .await
            .unwrap();

        for _ in 0..3 {
            let _ = mgr.verify_login("expire@example.com", "wrong password").await;
        }

        // Simulate the window elapsing
        sqlx::query("UPDATE account SET locked_until = ?1 WHERE id = ?2")
            .bind(Utc::now() - chrono::Duration::seconds(1))
            .bind(&account.id)
            .execute(&mgr.db)
            .await
            .unwrap();

        let logged_in = mgr
            .verify_login("expire@example.com", "a strong passphrase")
            .await
            .unwrap();
        assert_eq!(logged_in.failed_login_attempts, 0);

        let row = mgr.get_account(&account.id).await.unwrap();
        assert_eq!(row.failed_login_attempts, 0);
        assert!(row.locked_until.is_none());
    }

    #[tokio::test]
    async fn test_set_password_bumps_version_and_revokes_tokens() {
        let mgr = manager().await;
        let account = mgr
            .create_account("reset@example.com", "a strong passphrase", "R")
            .await
            .unwrap();

        // Seed a live refresh-token row directly
        sqlx::query(
            "INSERT INTO refresh_token (id, account_id, token_hash, family_id, revoked,
                                        expires_at, created_at)
             VALUES ('tok-1', ?1, 'hash', 'fam-1', 0, ?2, ?3)",
        )
        .bind(&account.id)
        .bind(Utc::now() + chrono::Duration::days(1))
        .bind(Utc::now())
        .execute(&mgr.db)
        .await
        .unwrap();

        mgr.set_password(&account.id, "a different passphrase")
            .await
            .unwrap();

        let row = mgr.get_account(&account.id).await.unwrap();
        assert_eq!(row.token_version, account.token_version + 1);

        let revoked: bool =
            sqlx::query_scalar("SELECT revoked FROM refresh_token WHERE id = 'tok-1'")
                .fetch_one(&mgr.db)
                .await
                .unwrap();
        assert!(revoked);

        // Old password no longer works, new one does
        assert!(matches!(
            mgr.verify_login("reset@example.com", "a strong passphrase").await,
            Err(CoreError::InvalidCredentials)
        ));
        assert!(mgr
            .verify_login("reset@example.com", "a different passphrase")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_rotate_note_key_is_monotonic() {
        let mgr = manager().await;
        let account = mgr
            .create_account("keys@example.com", "a strong passphrase", "K")
            .await
            .unwrap();

        assert_eq!(mgr.rotate_note_key(&account.id).await.unwrap(), 2);
        assert_eq!(mgr.rotate_note_key(&account.id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_delete_account_cascades() {
        let mgr = manager().await;
        let account = mgr
            .create_account("gone@example.com", "a strong passphrase", "G")
            .await
            .unwrap();

        sqlx::query(
            "INSERT INTO refresh_token (id, account_id, token_hash, family_id, revoked,
                                        expires_at, created_at)
             VALUES ('tok-2', ?1, 'hash', 'fam-2', 0, ?2, ?3)",
        )
        .bind(&account.id)
        .bind(Utc::now() + chrono::Duration::days(1))
        .bind(Utc::now())
        .execute(&mgr.db)
        .await
        .unwrap();

        mgr.delete_account(&account.id).await.unwrap();

        let tokens: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM refresh_token WHERE account_id = ?1")
                .bind(&account.id)
                .fetch_one(&mgr.db)
                .await
                .unwrap();
        assert_eq!(tokens, 0);
        assert!(matches!(
            mgr.get_account(&account.id).await,
            Err(CoreError::NotFound(_))
        ));
    }
}
