//! Token secret generation, one-way digests, and the opaque refresh-token
//! wire format `rt_<recordId>.<hexSecret>`.

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Prefix of the external refresh-token representation
pub const REFRESH_TOKEN_PREFIX: &str = "rt_";

/// Generate `n` cryptographically secure random bytes, hex-encoded
pub fn random_secret(n: usize) -> String {
    let mut bytes = vec![0u8; n];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// One-way SHA-256 digest, hex-encoded.
///
/// Used for refresh-token secrets, IPs, and user agents so raw values never
/// persist.
pub fn sha256_hex(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

/// Encode a refresh token for the wire
pub fn encode_refresh_token(record_id: &str, secret: &str) -> String {
    format!("{}{}.{}", REFRESH_TOKEN_PREFIX, record_id, secret)
}

/// Decode an opaque refresh token into (record id, secret).
///
/// Rejects anything that is not exactly `rt_<id>.<secret>` with both parts
/// non-empty and a single separator, before any database lookup happens.
pub fn decode_refresh_token(raw: &str) -> Option<(String, String)> {
    let rest = raw.strip_prefix(REFRESH_TOKEN_PREFIX)?;

    let mut parts = rest.split('.');
    let record_id = parts.next()?;
    let secret = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    if record_id.is_empty() || secret.is_empty() {
        return None;
    }

    Some((record_id.to_string(), secret.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_secret_length_and_uniqueness() {
        let a = random_secret(32);
        let b = random_secret(32);

        assert_eq!(a.len(), 64); // hex doubles
        assert_ne!(a, b);
    }

    #[test]
    fn test_sha256_is_deterministic() {
        assert_eq!(sha256_hex("10.0.0.1"), sha256_hex("10.0.0.1"));
        assert_ne!(sha256_hex("10.0.0.1"), sha256_hex("10.0.0.2"));
        assert_eq!(sha256_hex("x").len(), 64);
    }

    #[test]
    fn test_refresh_token_round_trip() {
        let raw = encode_refresh_token("0b5ee1a2", "deadbeef");
        assert_eq!(raw, "rt_0b5ee1a2.deadbeef");

        let (id, secret) = decode_refresh_token(&raw).unwrap();
        assert_eq!(id, "0b5ee1a2");
        assert_eq!(secret, "deadbeef");
    }

    #[test]
    fn test_decode_rejects_malformed_input() {
        assert!(decode_refresh_token("").is_none());
        assert!(decode_refresh_token("abc.def").is_none()); // missing prefix
        assert!(decode_refresh_token("rt_nodot").is_none());
        assert!(decode_refresh_token("rt_.secret").is_none()); // empty id
        assert!(decode_refresh_token("rt_id.").is_none()); // empty secret
        assert!(decode_refresh_token("rt_id.a.b").is_none()); // extra separator
        assert!(decode_refresh_token("RT_id.secret").is_none()); // wrong case
    }
}
