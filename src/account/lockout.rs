//! Brute-force lockout policy.
//!
//! Two layers drive the login state machine: a progressive per-request
//! delay indexed by the account's failed-attempt counter, and a hard
//! lockout window once the counter reaches the configured threshold. The
//! delay is the primary throttle and is independent of the outer
//! per-request rate limiter.

use crate::config::LockoutConfig;
use chrono::Duration;
use std::time::Duration as StdDuration;

/// Progressive delay table in seconds, indexed by failed-attempt count and
/// clamped to its final entry. No jitter is applied.
const PROGRESSIVE_DELAYS_SECS: [u64; 8] = [0, 0, 0, 1, 1, 3, 3, 10];

/// Delay to impose on a login attempt given the current failure counter
pub fn delay_for(failed_attempts: i64) -> StdDuration {
    let idx = failed_attempts
        .max(0)
        .min(PROGRESSIVE_DELAYS_SECS.len() as i64 - 1) as usize;
    StdDuration::from_secs(PROGRESSIVE_DELAYS_SECS[idx])
}

/// Hard-lockout policy derived from configuration
#[derive(Debug, Clone)]
pub struct LockoutPolicy {
    pub max_attempts: i64,
    pub lockout_window: Duration,
}

impl LockoutPolicy {
    pub fn from_config(config: &LockoutConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            lockout_window: Duration::minutes(config.lockout_minutes),
        }
    }

    /// Whether a failure count has reached the hard-lockout threshold
    pub fn locks_at(&self, failed_attempts: i64) -> bool {
        failed_attempts >= self.max_attempts
    }
}
