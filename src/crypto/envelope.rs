//! Envelope encryption for sensitive note text.
//!
//! Each blob is protected by AES-256-GCM under a key derived on demand with
//! HKDF-SHA256 from the master secret plus the owning account and a key
//! version; no derived key is ever persisted. The AAD binds the ciphertext
//! to the account, the record, and the key version, so a blob copied into
//! another user's row (or another record, or replayed across a key rotation)
//! fails tag verification instead of decrypting.
//!
//! Blob layout: `IV (12 bytes) || tag (16 bytes) || ciphertext`.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{CoreError, CoreResult};

/// Size of the AES-GCM nonce in bytes
pub const IV_SIZE: usize = 12;

/// Size of the GCM authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// Smallest valid blob: IV + tag around an empty ciphertext
pub const MIN_BLOB_SIZE: usize = IV_SIZE + TAG_SIZE;

/// Size of derived keys in bytes (AES-256)
const KEY_SIZE: usize = 32;

/// Authenticated encryption service for per-record note blobs
#[derive(Clone)]
pub struct EnvelopeService {
    master_secret: Vec<u8>,
}

impl EnvelopeService {
    /// Create a new envelope service around the master secret
    pub fn new(master_secret: Vec<u8>) -> Self {
        Self { master_secret }
    }

    /// Derive the 32-byte key for (account, key version).
    ///
    /// Deterministic: the same pair always yields the same key.
    fn derive_key(&self, account_id: &str, key_version: i64) -> CoreResult<Zeroizing<[u8; KEY_SIZE]>> {
        let hk = Hkdf::<Sha256>::new(None, &self.master_secret);
        let info = format!("note:{}:v{}", account_id, key_version);

        let mut okm = Zeroizing::new([0u8; KEY_SIZE]);
        hk.expand(info.as_bytes(), okm.as_mut())
            .map_err(|_| CoreError::Internal("Key derivation failed".to_string()))?;

        Ok(okm)
    }

    /// Encrypt plaintext for one record, returning `IV || tag || ciphertext`
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        account_id: &str,
        record_id: &str,
        key_version: i64,
    ) -> CoreResult<Vec<u8>> {
        let key = self.derive_key(account_id, key_version)?;
        let cipher = Aes256Gcm::new_from_slice(key.as_ref())
            .map_err(|_| CoreError::Internal("Cipher init failed".to_string()))?;

        let mut iv = [0u8; IV_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut iv);
        let nonce = Nonce::from_slice(&iv);

        let aad = blob_aad(account_id, record_id, key_version);
        // aes-gcm appends the tag to the ciphertext; reorder into the
        // IV || tag || ciphertext storage layout.
        let sealed = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad: aad.as_bytes(),
                },
            )
            .map_err(|_| CoreError::Internal("Encryption failed".to_string()))?;

        let ct_len = sealed.len() - TAG_SIZE;
        let mut blob = Vec::with_capacity(MIN_BLOB_SIZE + ct_len);
        blob.extend_from_slice(&iv);
        blob.extend_from_slice(&sealed[ct_len..]);
        blob.extend_from_slice(&sealed[..ct_len]);

        Ok(blob)
    }

    /// Decrypt a blob, verifying the tag and the AAD binding.
    ///
    /// Fails closed with an integrity error on a short blob, a bad tag, or
    /// any mismatch in the (account, record, key version) triple - garbage
    /// plaintext is never returned.
    pub fn decrypt(
        &self,
        blob: &[u8],
        account_id: &str,
        record_id: &str,
        key_version: i64,
    ) -> CoreResult<Vec<u8>> {
        if blob.len() < MIN_BLOB_SIZE {
            return Err(CoreError::Integrity(format!(
                "Blob too short: {} bytes",
                blob.len()
            )));
        }

        let iv = &blob[..IV_SIZE];
        let tag = &blob[IV_SIZE..MIN_BLOB_SIZE];
        let ciphertext = &blob[MIN_BLOB_SIZE..];

        let key = self.derive_key(account_id, key_version)?;
        let cipher = Aes256Gcm::new_from_slice(key.as_ref())
            .map_err(|_| CoreError::Internal("Cipher init failed".to_string()))?;

        let aad = blob_aad(account_id, record_id, key_version);
        let mut sealed = Vec::with_capacity(ciphertext.len() + TAG_SIZE);
        sealed.extend_from_slice(ciphertext);
        sealed.extend_from_slice(tag);

        cipher
            .decrypt(
                Nonce::from_slice(iv),
                Payload {
                    msg: &sealed,
                    aad: aad.as_bytes(),
                },
            )
            .map_err(|_| CoreError::Integrity("AEAD tag verification failed".to_string()))
    }
}

/// AAD binding a blob to its owner, record, and key version.
///
/// Account and record ids are UUIDs and cannot contain ':', so the join is
/// unambiguous.
fn blob_aad(account_id: &str, record_id: &str, key_version: i64) -> String {
    format!("{}:{}:v{}", account_id, record_id, key_version)
}
