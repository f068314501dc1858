//! Short-lived access tokens (HS256 JWTs).
//!
//! Tokens are stateless for routing but not for revocation: every claim set
//! carries the account's token version, and verification compares it
//! against the current value in storage (see `SessionManager`), so a
//! version bump invalidates all outstanding tokens at once.

use crate::{
    config::ServerConfig,
    error::{CoreError, CoreResult},
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `iss` claim on every issued token
pub const ISSUER: &str = "lumen-core";

/// `aud` claim on every issued token
pub const AUDIENCE: &str = "lumen-app";

/// Clock skew tolerance in seconds
const LEEWAY_SECS: u64 = 30;

/// Access token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub email: String,
    /// Account token version at issuance; must still match at verification
    pub tv: i64,
    /// Unique per-token identifier for traceability
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

/// Signs and decodes access tokens
#[derive(Clone)]
pub struct AccessTokenIssuer {
    jwt_secret: String,
    ttl_minutes: i64,
}

impl AccessTokenIssuer {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            jwt_secret: config.authentication.jwt_secret.clone(),
            ttl_minutes: config.authentication.access_ttl_minutes,
        }
    }

    /// Mint a signed access token bound to the given token version
    pub fn issue(&self, account_id: &str, email: &str, token_version: i64) -> CoreResult<String> {
        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            sub: account_id.to_string(),
            email: email.to_string(),
            tv: token_version,
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now + self.ttl_minutes * 60,
            iss: ISSUER.to_string(),
            aud: AUDIENCE.to_string(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| CoreError::Jwt(format!("Failed to sign token: {}", e)))
    }

    /// Decode and validate signature, expiry, issuer, and audience.
    ///
    /// The token-version check against storage is the caller's job; this
    /// layer is purely cryptographic.
    pub fn decode(&self, token: &str) -> CoreResult<AccessClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.set_audience(&[AUDIENCE]);
        validation.leeway = LEEWAY_SECS;

        decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => CoreError::TokenExpired,
            _ => CoreError::InvalidToken,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;

    fn issuer() -> AccessTokenIssuer {
        AccessTokenIssuer::new(&test_config())
    }

    #[test]
    fn test_issue_and_decode_round_trip() {
        let issuer = issuer();
        let token = issuer.issue("acct-1", "a@example.com", 4).unwrap();
        let claims = issuer.decode(&token).unwrap();

        assert_eq!(claims.sub, "acct-1");
        assert_eq!(claims.email, "a@example.com");
        assert_eq!(claims.tv, 4);
        assert_eq!(claims.iss, ISSUER);
        assert_eq!(claims.aud, AUDIENCE);
        assert!(!claims.jti.is_empty());
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_unique_jti_per_token() {
        let issuer = issuer();
        let t1 = issuer.issue("acct-1", "a@example.com", 0).unwrap();
        let t2 = issuer.issue("acct-1", "a@example.com", 0).unwrap();

        let c1 = issuer.decode(&t1).unwrap();
        let c2 = issuer.decode(&t2).unwrap();
        assert_ne!(c1.jti, c2.jti);
    }

    #[test]
    fn test_rejects_garbage_and_wrong_key() {
        let issuer = issuer();
        assert!(matches!(
            issuer.decode("not.a.jwt"),
            Err(CoreError::InvalidToken)
        ));

        let mut other_config = test_config();
        other_config.authentication.jwt_secret =
            "another-secret-another-secret-another".to_string();
        let other = AccessTokenIssuer::new(&other_config);
        let token = other.issue("acct-1", "a@example.com", 0).unwrap();

        assert!(matches!(issuer.decode(&token), Err(CoreError::InvalidToken)));
    }

    #[test]
    fn test_expired_token_is_typed_as_expired() {
        let issuer = issuer();
        // Hand-craft claims well past expiry (beyond leeway)
        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            sub: "acct-1".to_string(),
            email: "a@example.com".to_string(),
            tv: 0,
            jti: "test-jti".to_string(),
            iat: now - 7200,
            exp: now - 3600,
            iss: ISSUER.to_string(),
            aud: AUDIENCE.to_string(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(test_config().authentication.jwt_secret.as_bytes()),
        )
        .unwrap();

        assert!(matches!(issuer.decode(&token), Err(CoreError::TokenExpired)));
    }

    #[test]
    fn test_rejects_wrong_audience() {
        let issuer = issuer();
        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            sub: "acct-1".to_string(),
            email: "a@example.com".to_string(),
            tv: 0,
            jti: "test-jti".to_string(),
            iat: now,
            exp: now + 600,
            iss: ISSUER.to_string(),
            aud: "someone-else".to_string(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(test_config().authentication.jwt_secret.as_bytes()),
        )
        .unwrap();

        assert!(matches!(issuer.decode(&token), Err(CoreError::InvalidToken)));
    }
}
