//! Wall-clock helpers
//!
//! Heartbeats and telemetry stamps are milliseconds since the Unix epoch.
//! A clock set before the epoch reads as 0 rather than panicking.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time in milliseconds since Unix epoch
pub fn now_millis() -> i64 {
    now_millis_u64().min(i64::MAX as u64) as i64
}

/// Current time in milliseconds since Unix epoch, unsigned (heartbeat slot)
pub fn now_millis_u64() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
