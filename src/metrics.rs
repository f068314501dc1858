/// Security metrics for the Lumen core
///
/// Prometheus counters for the events that matter when auditing the
/// credential subsystem: login outcomes, lockouts, token rotation, and
/// reuse/family-revocation incidents.

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, Encoder, IntCounter, TextEncoder,
};

lazy_static! {
    /// Successful password logins
    pub static ref LOGIN_SUCCESS_TOTAL: IntCounter = register_int_counter!(
        "lumen_login_success_total",
        "Total number of successful logins"
    )
    .unwrap();

    /// Failed password logins (wrong password or unknown email)
    pub static ref LOGIN_FAILURE_TOTAL: IntCounter = register_int_counter!(
        "lumen_login_failure_total",
        "Total number of failed login attempts"
    )
    .unwrap();

    /// Hard lockouts applied after repeated failures
    pub static ref LOCKOUTS_TOTAL: IntCounter = register_int_counter!(
        "lumen_lockouts_total",
        "Total number of account lockouts applied"
    )
    .unwrap();

    /// Requests rejected while a lockout window was active
    pub static ref LOCKED_REJECTIONS_TOTAL: IntCounter = register_int_counter!(
        "lumen_locked_rejections_total",
        "Login attempts rejected during an active lockout window"
    )
    .unwrap();

    /// Successful refresh-token rotations
    pub static ref TOKEN_ROTATIONS_TOTAL: IntCounter = register_int_counter!(
        "lumen_token_rotations_total",
        "Total number of successful refresh-token rotations"
    )
    .unwrap();

    /// Reuse of an already-rotated refresh token
    pub static ref TOKEN_REUSE_TOTAL: IntCounter = register_int_counter!(
        "lumen_token_reuse_total",
        "Detected refresh-token reuse events"
    )
    .unwrap();

    /// Token families force-revoked after a reuse event
    pub static ref FAMILY_REVOCATIONS_TOTAL: IntCounter = register_int_counter!(
        "lumen_family_revocations_total",
        "Token families revoked after reuse detection"
    )
    .unwrap();

    /// Decrypt calls that failed integrity verification
    pub static ref INTEGRITY_FAILURES_TOTAL: IntCounter = register_int_counter!(
        "lumen_integrity_failures_total",
        "Note decryptions that failed AEAD verification"
    )
    .unwrap();
}

/// Render all registered metrics in Prometheus text format
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
