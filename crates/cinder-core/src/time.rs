//! Wall-clock time utilities.
//!
//! TTLs are stored as absolute milliseconds since the Unix epoch so they
//! survive an AOF round trip (`PEXPIREAT` carries the same unit on the
//! wire).

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Returns the current wall-clock time in milliseconds since the epoch.
#[inline]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Returns true if the given absolute expiry timestamp has passed.
#[inline]
pub fn is_expired(expires_at_ms: u64) -> bool {
    now_ms() >= expires_at_ms
}

/// Converts an absolute expiry to a delay from now, saturating at zero.
#[inline]
pub fn until(expires_at_ms: u64) -> Duration {
    Duration::from_millis(expires_at_ms.saturating_sub(now_ms()))
}
