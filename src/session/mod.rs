/// Session management system
///
/// Issues and rotates refresh tokens, mints short-lived access tokens, and
/// enforces instant global revocation through the per-account token version.

pub mod access;
mod rotation;

pub use rotation::SessionManager;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token pair returned by login and refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// Device metadata supplied by the client at login
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceMeta {
    pub device_id: Option<String>,
    pub device_name: Option<String>,
}

/// Network metadata extracted from the request. Raw values are hashed
/// before they reach storage.
#[derive(Debug, Clone, Default)]
pub struct NetworkMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Result of access-token verification
#[derive(Debug, Clone)]
pub struct ValidatedAccess {
    pub account_id: String,
    pub email: String,
}

/// Active session row for the device-management screen. Never exposes
/// token material.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub device_id: Option<String>,
    pub device_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

/// Login request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(flatten)]
    pub device: DeviceMeta,
}

/// Token refresh request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Logout request (single device)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub refresh_token: String,
}

/// List of active sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionListResponse {
    pub sessions: Vec<SessionInfo>,
}
