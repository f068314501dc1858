/// Mood entry storage
///
/// The only consumer of the envelope service inside the core: every note
/// write is encrypted before it reaches the table, and every read decrypts
/// under the key version stored beside the blob. Edits replace the blob
/// wholesale; clearing the note nulls both columns.

use crate::{
    crypto::envelope::EnvelopeService,
    db::models::Entry,
    error::{CoreError, CoreResult},
    metrics,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

const MOOD_MIN: i64 = 1;
const MOOD_MAX: i64 = 10;

const ENTRY_COLUMNS: &str = "id, account_id, mood, note_cipher, note_key_version, \
                             recorded_at, created_at, updated_at";

/// Create / update request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryInput {
    pub mood: i64,
    /// None clears the note
    pub note: Option<String>,
    pub recorded_at: Option<DateTime<Utc>>,
}

/// Entry with the note decrypted for the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryView {
    pub id: String,
    pub mood: i64,
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Entry store service
pub struct EntryStore {
    db: SqlitePool,
    envelope: Arc<EnvelopeService>,
}

impl EntryStore {
    /// Create a new entry store
    pub fn new(db: SqlitePool, envelope: Arc<EnvelopeService>) -> Self {
        Self { db, envelope }
    }

    /// Create an entry, encrypting the note under the account's current key
    /// version.
    pub async fn create_entry(&self, account_id: &str, input: EntryInput) -> CoreResult<EntryView> {
        validate_mood(input.mood)?;

        let key_version = self.current_key_version(account_id).await?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let recorded_at = input.recorded_at.unwrap_or(now);

        let (note_cipher, note_key_version) = match input.note.as_deref() {
            Some(note) => (
                Some(self.envelope.encrypt(note.as_bytes(), account_id, &id, key_version)?),
                Some(key_version),
            ),
            None => (None, None),
        };

        sqlx::query(
            "INSERT INTO entry (id, account_id, mood, note_cipher, note_key_version,
                                recorded_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        )
        .bind(&id)
        .bind(account_id)
        .bind(input.mood)
        .bind(&note_cipher)
        .bind(note_key_version)
        .bind(recorded_at)
        .bind(now)
        .execute(&self.db)
        .await
        .map_err(CoreError::Database)?;

        Ok(EntryView {
            id,
            mood: input.mood,
            note: input.note,
            recorded_at,
            created_at: now,
            updated_at: now,
        })
    }

    /// Fetch one entry with its note decrypted
    pub async fn get_entry(&self, account_id: &str, entry_id: &str) -> CoreResult<EntryView> {
        let entry = self.fetch_owned(account_id, entry_id).await?;
        self.decrypt_view(entry)
    }

    /// List recent entries, newest first
    pub async fn list_entries(&self, account_id: &str, limit: i64) -> CoreResult<Vec<EntryView>> {
        let rows = sqlx::query_as::<_, Entry>(&format!(
            "SELECT {} FROM entry WHERE account_id = ?1
             ORDER BY recorded_at DESC LIMIT ?2",
            ENTRY_COLUMNS
        ))
        .bind(account_id)
        .bind(limit.clamp(1, 200))
        .fetch_all(&self.db)
        .await
        .map_err(CoreError::Database)?;

        rows.into_iter().map(|e| self.decrypt_view(e)).collect()
    }

    /// Replace an entry. The note blob is always rewritten in full - never
    /// patched - and a cleared note nulls both cipher columns.
    pub async fn update_entry(
        &self,
        account_id: &str,
        entry_id: &str,
        input: EntryInput,
    ) -> CoreResult<EntryView> {
        validate_mood(input.mood)?;

        // Ownership check before any write
        let existing = self.fetch_owned(account_id, entry_id).await?;

        let key_version = self.current_key_version(account_id).await?;
        let now = Utc::now();
        let recorded_at = input.recorded_at.unwrap_or(existing.recorded_at);

        let (note_cipher, note_key_version) = match input.note.as_deref() {
            Some(note) => (
                Some(self.envelope.encrypt(note.as_bytes(), account_id, entry_id, key_version)?),
                Some(key_version),
            ),
            None => (None, None),
        };

        sqlx::query(
            "UPDATE entry SET mood = ?1, note_cipher = ?2, note_key_version = ?3,
                              recorded_at = ?4, updated_at = ?5
             WHERE id = ?6 AND account_id = ?7",
        )
        .bind(input.mood)
        .bind(&note_cipher)
        .bind(note_key_version)
        .bind(recorded_at)
        .bind(now)
        .bind(entry_id)
        .bind(account_id)
        .execute(&self.db)
        .await
        .map_err(CoreError::Database)?;

        Ok(EntryView {
            id: entry_id.to_string(),
            mood: input.mood,
            note: input.note,
            recorded_at,
            created_at: existing.created_at,
            updated_at: now,
        })
    }

    /// Delete an entry
    pub async fn delete_entry(&self, account_id: &str, entry_id: &str) -> CoreResult<()> {
        let deleted = sqlx::query("DELETE FROM entry WHERE id = ?1 AND account_id = ?2")
            .bind(entry_id)
            .bind(account_id)
            .execute(&self.db)
            .await
            .map_err(CoreError::Database)?
            .rows_affected();

        if deleted == 0 {
            return Err(CoreError::NotFound("Entry not found".to_string()));
        }
        Ok(())
    }

    async fn fetch_owned(&self, account_id: &str, entry_id: &str) -> CoreResult<Entry> {
        sqlx::query_as::<_, Entry>(&format!(
            "SELECT {} FROM entry WHERE id = ?1 AND account_id = ?2",
            ENTRY_COLUMNS
        ))
        .bind(entry_id)
        .bind(account_id)
        .fetch_optional(&self.db)
        .await
        .map_err(CoreError::Database)?
        .ok_or_else(|| CoreError::NotFound("Entry not found".to_string()))
    }

    async fn current_key_version(&self, account_id: &str) -> CoreResult<i64> {
        sqlx::query_scalar("SELECT encryption_key_version FROM account WHERE id = ?1")
            .bind(account_id)
            .fetch_optional(&self.db)
            .await
            .map_err(CoreError::Database)?
            .ok_or_else(|| CoreError::NotFound("Account not found".to_string()))
    }

    /// Decrypt the note in a row. A tag or AAD failure surfaces as an
    /// integrity error - it is never coerced into empty plaintext.
    fn decrypt_view(&self, entry: Entry) -> CoreResult<EntryView> {
        let note = match (&entry.note_cipher, entry.note_key_version) {
            (Some(blob), Some(key_version)) => {
                let plaintext = self
                    .envelope
                    .decrypt(blob, &entry.account_id, &entry.id, key_version)
                    .map_err(|e| {
                        metrics::INTEGRITY_FAILURES_TOTAL.inc();
                        tracing::error!(entry_id = %entry.id, "Note failed integrity verification");
                        e
                    })?;
                Some(String::from_utf8(plaintext).map_err(|_| {
                    CoreError::Integrity("Decrypted note is not valid UTF-8".to_string())
                })?)
            }
            (Some(_), None) => {
                return Err(CoreError::Integrity(
                    "Note blob present without a key version".to_string(),
                ));
            }
            _ => None,
        };

        Ok(EntryView {
            id: entry.id,
            mood: entry.mood,
            note,
            recorded_at: entry.recorded_at,
            created_at: entry.created_at,
            updated_at: entry.updated_at,
        })
    }
}

fn validate_mood(mood: i64) -> CoreResult<()> {
    if !(MOOD_MIN..=MOOD_MAX).contains(&mood) {
        return Err(CoreError::Validation(format!(
            "Mood must be between {} and {}",
            MOOD_MIN, MOOD_MAX
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{account::AccountManager, config::test_config, db};

    struct Setup {
        store: EntryStore,
        accounts: AccountManager,
        account_id: String,
        pool: SqlitePool,
    }

    async fn setup() -> Setup {
        let pool = db::test_pool().await;
        let config = Arc::new(test_config());
        let accounts = AccountManager::new(pool.clone(), config.clone());
        let envelope = Arc::new(EnvelopeService::new(config.master_key().unwrap()));
        let store = EntryStore::new(pool.clone(), envelope);

        let account = accounts
            .create_account("writer@example.com", "a strong passphrase", "Writer")
            .await
            .unwrap();

        Setup {
            store,
            accounts,
            account_id: account.id,
            pool,
        }
    }

    #[tokio::test]
    async fn test_note_round_trip_is_encrypted_at_rest() {
        let s = setup().await;
        let entry = s
            .store
            .create_entry(
                &s.account_id,
                EntryInput {
                    mood: 7,
                    note: Some("rough morning, better evening".to_string()),
                    recorded_at: None,
                },
            )
            .await
            .unwrap();

        // Plaintext never hits the table
        let blob: Vec<u8> =
            sqlx::query_scalar("SELECT note_cipher FROM entry WHERE id = ?1")
                .bind(&entry.id)
                .fetch_one(&s.pool)
                .await
                .unwrap();
        assert!(blob.len() >= 28);
        let haystack = String::from_utf8_lossy(&blob);
        assert!(!haystack.contains("rough morning"));

        let read = s.store.get_entry(&s.account_id, &entry.id).await.unwrap();
        assert_eq!(read.note.as_deref(), Some("rough morning, better evening"));
        assert_eq!(read.mood, 7);
    }

    #[tokio::test]
    async fn test_entry_without_note_stores_null() {
        let s = setup().await;
        let entry = s
            .store
            .create_entry(
                &s.account_id,
                EntryInput {
                    mood: 5,
                    note: None,
                    recorded_at: None,
                },
            )
            .await
            .unwrap();

        let read = s.store.get_entry(&s.account_id, &entry.id).await.unwrap();
        assert!(read.note.is_none());
    }

    #[tokio::test]
    async fn test_update_replaces_blob_and_clearing_nulls_it() {
        let s = setup().await;
        let entry = s
            .store
            .create_entry(
                &s.account_id,
                EntryInput {
                    mood: 4,
                    note: Some("first draft".to_string()),
                    recorded_at: None,
                },
            )
            .await
            .unwrap();

        let before: Vec<u8> = sqlx::query_scalar("SELECT note_cipher FROM entry WHERE id = ?1")
            .bind(&entry.id)
            .fetch_one(&s.pool)
            .await
            .unwrap();

        s.store
            .update_entry(
                &s.account_id,
                &entry.id,
                EntryInput {
                    mood: 6,
                    note: Some("second draft".to_string()),
                    recorded_at: None,
                },
            )
            .await
            .unwrap();

        let after: Vec<u8> = sqlx::query_scalar("SELECT note_cipher FROM entry WHERE id = ?1")
            .bind(&entry.id)
            .fetch_one(&s.pool)
            .await
            .unwrap();
        assert_ne!(before, after);

        s.store
            .update_entry(
                &s.account_id,
                &entry.id,
                EntryInput {
                    mood: 6,
                    note: None,
                    recorded_at: None,
                },
            )
            .await
            .unwrap();

        let cleared: Option<Vec<u8>> =
            sqlx::query_scalar("SELECT note_cipher FROM entry WHERE id = ?1")
                .bind(&entry.id)
                .fetch_one(&s.pool)
                .await
                .unwrap();
        assert!(cleared.is_none());
    }

    #[tokio::test]
    async fn test_ciphertext_substitution_fails_integrity() {
        let s = setup().await;
        let victim = s
            .store
            .create_entry(
                &s.account_id,
                EntryInput {
                    mood: 3,
                    note: Some("private thought".to_string()),
                    recorded_at: None,
                },
            )
            .await
            .unwrap();
        let target = s
            .store
            .create_entry(
                &s.account_id,
                EntryInput {
                    mood: 8,
                    note: Some("another note".to_string()),
                    recorded_at: None,
                },
            )
            .await
            .unwrap();

        // Attacker with write access copies one row's blob into another
        sqlx::query(
            "UPDATE entry SET note_cipher =
                 (SELECT note_cipher FROM entry WHERE id = ?1)
             WHERE id = ?2",
        )
        .bind(&victim.id)
        .bind(&target.id)
        .execute(&s.pool)
        .await
        .unwrap();

        assert!(matches!(
            s.store.get_entry(&s.account_id, &target.id).await,
            Err(CoreError::Integrity(_))
        ));
    }

    #[tokio::test]
    async fn test_old_notes_survive_key_rotation() {
        let s = setup().await;
        let entry = s
            .store
            .create_entry(
                &s.account_id,
                EntryInput {
                    mood: 9,
                    note: Some("written under v1".to_string()),
                    recorded_at: None,
                },
            )
            .await
            .unwrap();

        s.accounts.rotate_note_key(&s.account_id).await.unwrap();

        // Old blob decrypts under its recorded version
        let read = s.store.get_entry(&s.account_id, &entry.id).await.unwrap();
        assert_eq!(read.note.as_deref(), Some("written under v1"));

        // New writes pick up the bumped version
        let fresh = s
            .store
            .create_entry(
                &s.account_id,
                EntryInput {
                    mood: 2,
                    note: Some("written under v2".to_string()),
                    recorded_at: None,
                },
            )
            .await
            .unwrap();
        let version: i64 =
            sqlx::query_scalar("SELECT note_key_version FROM entry WHERE id = ?1")
                .bind(&fresh.id)
                .fetch_one(&s.pool)
                .await
                .unwrap();
        assert_eq!(version, 2);
    }

    #[tokio::test]
    async fn test_cross_account_access_is_not_found() {
        let s = setup().await;
        let other = s
            .accounts
            .create_account("other@example.com", "a strong passphrase", "Other")
            .await
            .unwrap();

        let entry = s
            .store
            .create_entry(
                &s.account_id,
                EntryInput {
                    mood: 5,
                    note: Some("mine".to_string()),
                    recorded_at: None,
                },
            )
            .await
            .unwrap();

        assert!(matches!(
            s.store.get_entry(&other.id, &entry.id).await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_mood_bounds() {
        let s = setup().await;
        for mood in [0, 11, -3] {
            assert!(matches!(
                s.store
                    .create_entry(
                        &s.account_id,
                        EntryInput {
                            mood,
                            note: None,
                            recorded_at: None
                        }
                    )
                    .await,
                Err(CoreError::Validation(_))
            ));
        }
    }
}
