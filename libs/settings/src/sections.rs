//! Per-component configuration sections

use crate::error::SettingsError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// `sockaddr_un.sun_path` capacity minus the terminating NUL
const MAX_SOCKET_PATH: usize = 107;

/// Shared-memory sensor transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    /// Control socket the producer listens on
    pub socket_path: String,
    /// Heartbeat age beyond which the source is reported stale
    pub stale_threshold_ms: u64,
    /// Producer heartbeat refresh period
    pub heartbeat_interval_ms: u64,
    /// Slot size including the frame header (producer side)
    pub frame_size: u32,
    /// Number of slots (producer side)
    pub frame_count: u32,
    /// Upper bound on frames consumed per poll
    pub max_frames_per_poll: usize,
    pub poll_interval_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            socket_path: "/tmp/z-monitor-sensor.sock".to_string(),
            stale_threshold_ms: 5_000,
            heartbeat_interval_ms: 10,
            frame_size: 4096,
            frame_count: 2048,
            max_frames_per_poll: 10,
            poll_interval_ms: 1,
            connect_timeout_ms: 2_000,
        }
    }
}

impl TransportSettings {
    pub fn stale_threshold(&self) -> Duration {
        Duration::from_millis(self.stale_threshold_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.socket_path.is_empty() {
            return Err(SettingsError::EmptySocketPath);
        }
        if self.socket_path.len() > MAX_SOCKET_PATH {
            return Err(SettingsError::SocketPathTooLong {
                len: self.socket_path.len(),
                max: MAX_SOCKET_PATH,
            });
        }
        if self.stale_threshold_ms == 0 {
            return Err(SettingsError::invalid(
                "transport.stale_threshold_ms",
                "must be greater than zero",
            ));
        }
        if self.heartbeat_interval_ms == 0 || self.heartbeat_interval_ms >= self.stale_threshold_ms {
            return Err(SettingsError::invalid(
                "transport.heartbeat_interval_ms",
                format!(
                    "must be in 1..{} (below the stale threshold)",
                    self.stale_threshold_ms
                ),
            ));
        }
        // Frame header is 24 bytes; a slot must also hold some payload
        if self.frame_size <= 24 {
            return Err(SettingsError::invalid(
                "transport.frame_size",
                "must exceed the 24-byte frame header",
            ));
        }
        if self.frame_count == 0 {
            return Err(SettingsError::invalid(
                "transport.frame_count",
                "must be greater than zero",
            ));
        }
        if self.max_frames_per_poll == 0 {
            return Err(SettingsError::invalid(
                "transport.max_frames_per_poll",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Circuit breaker guarding one external dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
    pub half_open_max_requests: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 60_000,
            half_open_max_requests: 3,
        }
    }
}

impl CircuitBreakerSettings {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.failure_threshold == 0 {
            return Err(SettingsError::invalid(
                "circuit_breaker.failure_threshold",
                "must be greater than zero",
            ));
        }
        if self.half_open_max_requests == 0 {
            return Err(SettingsError::invalid(
                "circuit_breaker.half_open_max_requests",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Retry with exponential backoff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts, including the first
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 5_000,
        }
    }
}

impl RetrySettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.max_delay_ms < self.base_delay_ms {
            return Err(SettingsError::invalid(
                "retry.max_delay_ms",
                format!("must be at least base_delay_ms ({})", self.base_delay_ms),
            ));
        }
        Ok(())
    }
}

/// Telemetry latency classification
///
/// A batch is `excellent` when its end-to-end latency is at most
/// `excellent_max_ms`, `good` up to `good_max_ms`, `acceptable` up to
/// `acceptable_max_ms`, and `slow` beyond that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    pub device_id: String,
    pub excellent_max_ms: i64,
    pub good_max_ms: i64,
    pub acceptable_max_ms: i64,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            device_id: "ZM-DEV-001".to_string(),
            excellent_max_ms: 1_000,
            good_max_ms: 5_000,
            acceptable_max_ms: 15_000,
        }
    }
}

impl TelemetrySettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.device_id.is_empty() {
            return Err(SettingsError::invalid(
                "telemetry.device_id",
                "must not be empty",
            ));
        }
        let ordered = 0 <= self.excellent_max_ms
            && self.excellent_max_ms <= self.good_max_ms
            && self.good_max_ms <= self.acceptable_max_ms;
        if !ordered {
            return Err(SettingsError::invalid(
                "telemetry",
                "thresholds must satisfy 0 <= excellent <= good <= acceptable",
            ));
        }
        Ok(())
    }
}
