/// Configuration management for the Lumen core
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub lockout: LockoutConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub core_db: PathBuf,
}

/// Authentication and encryption configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Master secret for note encryption, hex-encoded (32 bytes)
    pub master_key_hex: String,
    /// Access token lifetime in minutes
    pub access_ttl_minutes: i64,
    /// Refresh token lifetime in days
    pub refresh_ttl_days: i64,
}

/// Brute-force lockout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockoutConfig {
    /// Failed attempts before a hard lockout is applied
    pub max_attempts: i64,
    /// Lockout window in minutes
    pub lockout_minutes: i64,
}

/// Outer rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub authenticated_rps: u32,
    pub unauthenticated_rps: u32,
    pub burst_size: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> CoreResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("LUMEN_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("LUMEN_PORT")
            .unwrap_or_else(|_| "4380".to_string())
            .parse()
            .map_err(|_| CoreError::Validation("Invalid port number".to_string()))?;
        let version = env::var("LUMEN_VERSION").unwrap_or_else(|_| "0.1.0".to_string());

        let data_directory: PathBuf = env::var("LUMEN_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let core_db = env::var("LUMEN_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("lumen.sqlite"));

        let jwt_secret = env::var("LUMEN_JWT_SECRET")
            .map_err(|_| CoreError::Validation("JWT secret required".to_string()))?;
        let master_key_hex = env::var("LUMEN_MASTER_KEY_HEX")
            .map_err(|_| CoreError::Validation("Master encryption key required".to_string()))?;

        let access_ttl_minutes = env::var("LUMEN_ACCESS_TTL_MINUTES")
            .unwrap_or_else(|_| "15".to_string())
            .parse()
            .unwrap_or(15);
        let refresh_ttl_days = env::var("LUMEN_REFRESH_TTL_DAYS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);

        let max_attempts = env::var("LUMEN_LOCKOUT_MAX_ATTEMPTS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);
        let lockout_minutes = env::var("LUMEN_LOCKOUT_MINUTES")
            .unwrap_or_else(|_| "15".to_string())
            .parse()
            .unwrap_or(15);

        let rate_limit_enabled = env::var("LUMEN_RATE_LIMITS_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);
        let authenticated_rps = env::var("LUMEN_RATE_LIMIT_AUTHENTICATED_RPS")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .unwrap_or(100);
        let unauthenticated_rps = env::var("LUMEN_RATE_LIMIT_UNAUTHENTICATED_RPS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);
        let burst_size = env::var("LUMEN_RATE_LIMIT_BURST")
            .unwrap_or_else(|_| "50".to_string())
            .parse()
            .unwrap_or(50);

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                version,
            },
            storage: StorageConfig {
                data_directory,
                core_db,
            },
            authentication: AuthConfig {
                jwt_secret,
                master_key_hex,
                access_ttl_minutes,
                refresh_ttl_days,
            },
            lockout: LockoutConfig {
                max_attempts,
                lockout_minutes,
            },
            rate_limit: RateLimitConfig {
                enabled: rate_limit_enabled,
                authenticated_rps,
                unauthenticated_rps,
                burst_size,
            },
            logging: LoggingConfig { level: log_level },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> CoreResult<()> {
        if self.service.hostname.is_empty() {
            return Err(CoreError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(CoreError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        self.master_key()?;

        if self.lockout.max_attempts < 1 {
            return Err(CoreError::Validation(
                "Lockout threshold must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Decode the master encryption secret
    pub fn master_key(&self) -> CoreResult<Vec<u8>> {
        decode_master_key(&self.authentication.master_key_hex)
    }
}

fn decode_master_key(master_key_hex: &str) -> CoreResult<Vec<u8>> {
    let key = hex::decode(master_key_hex)
        .map_err(|_| CoreError::Validation("Master key must be hex-encoded".to_string()))?;

    if key.len() != 32 {
        return Err(CoreError::Validation(
            "Master key must be exactly 32 bytes".to_string(),
        ));
    }

    Ok(key)
}

/// Fixed configuration for unit tests: no env access, low lockout
/// threshold.
#[cfg(test)]
pub fn test_config() -> ServerConfig {
    ServerConfig {
        service: ServiceConfig {
            hostname: "localhost".to_string(),
            port: 0,
            version: "test".to_string(),
        },
        storage: StorageConfig {
            data_directory: "./data".into(),
            core_db: "./data/test.sqlite".into(),
        },
        authentication: AuthConfig {
            jwt_secret: "0123456789abcdef0123456789abcdef-test".to_string(),
            master_key_hex: "11".repeat(32),
            access_ttl_minutes: 15,
            refresh_ttl_days: 30,
        },
        lockout: LockoutConfig {
            max_attempts: 3,
            lockout_minutes: 15,
        },
        rate_limit: RateLimitConfig {
            enabled: false,
            authenticated_rps: 100,
            unauthenticated_rps: 10,
            burst_size: 50,
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_master_key_decoding() {
        assert_eq!(decode_master_key(&"ab".repeat(32)).unwrap().len(), 32);
        assert!(decode_master_key("not-hex").is_err());
        assert!(decode_master_key("abcd").is_err()); // wrong length
    }

    #[test]
    fn test_validate_accepts_test_config() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_short_jwt_secret() {
        let mut config = test_config();
        config.authentication.jwt_secret = "short".to_string();
        assert!(config.validate().is_err());
    }
}
