/// Database row models
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Account record in the database
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    /// Stored lowercased; lookups are case-insensitive
    pub email: String,
    pub display_name: String,
    pub password_hash: String,
    /// Monotonic counter; bumping it invalidates every issued access token
    pub token_version: i64,
    pub failed_login_attempts: i64,
    pub locked_until: Option<DateTime<Utc>>,
    /// Monotonic counter selecting the key that protects new note ciphertext
    pub encryption_key_version: i64,
    pub email_confirmed: bool,
    pub created_at: DateTime<Utc>,
}

/// One row per issued refresh token
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    pub id: String,
    pub account_id: String,
    /// SHA-256 hex of the random secret; the secret itself is never stored
    pub token_hash: String,
    /// Shared across an entire rotation chain
    pub family_id: String,
    pub revoked: bool,
    pub expires_at: DateTime<Utc>,
    pub device_id: Option<String>,
    pub device_name: Option<String>,
    pub ip_hash: Option<String>,
    pub user_agent_hash: Option<String>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    /// Check if the token is past its expiry
    #[inline]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Mood entry record. The note is present only as an AEAD blob.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub account_id: String,
    pub mood: i64,
    pub note_cipher: Option<Vec<u8>>,
    pub note_key_version: Option<i64>,
    pub recorded_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
