//! Circuit Breaker
//!
//! Prevents repeated calls to a dependency that is failing, and probes it
//! again once a reset window has passed.
//!
//! ## States
//!
//! ```text
//! CLOSED ──failure_threshold──> OPEN ──reset_timeout──> HALF_OPEN
//!   ↑                            ↑                         │
//!   │                            └──── any failure ────────┤
//!   └──── half_open_max_requests consecutive successes ────┘
//! ```
//!
//! - **Closed**: calls pass through; consecutive failures are counted
//! - **Open**: calls are rejected with `DependencyUnavailable` without
//!   invoking the operation. The first call after `reset_timeout` moves the
//!   breaker to half-open and is let through.
//! - **HalfOpen**: at most `half_open_max_requests` calls are admitted
//!
//! Transitions happen under a mutex that is never held while the guarded
//! operation runs. `state()` and `failure_count()` read atomics and never
//! block.

use parking_lot::Mutex;
use settings::CircuitBreakerSettings;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};
use types::{Error, Result};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl CircuitState {
    pub fn is_closed(&self) -> bool {
        matches!(self, CircuitState::Closed)
    }

    pub fn is_open(&self) -> bool {
        matches!(self, CircuitState::Open)
    }

    pub fn is_half_open(&self) -> bool {
        matches!(self, CircuitState::HalfOpen)
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Time after the last failure before a probe is allowed
    pub reset_timeout: Duration,
    /// Probes admitted while half-open, and successes needed to close
    pub half_open_max_requests: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            half_open_max_requests: 3,
        }
    }
}

impl CircuitBreakerConfig {
    /// Quick probing for local dependencies (database)
    pub fn fast_recovery() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(5),
            half_open_max_requests: 1,
        }
    }

    /// Slow probing for remote dependencies that need time to recover
    pub fn conservative() -> Self {
        Self {
            failure_threshold: 10,
            reset_timeout: Duration::from_secs(120),
            half_open_max_requests: 5,
        }
    }

    pub fn from_settings(settings: &CircuitBreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold.max(1),
            reset_timeout: settings.reset_timeout(),
            half_open_max_requests: settings.half_open_max_requests.max(1),
        }
    }
}

/// Snapshot for monitoring
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerStats {
    pub current_state: CircuitState,
    pub consecutive_failures: u32,
    pub half_open_successes: u32,
    pub total_calls: u64,
    pub total_failures: u64,
    pub total_successes: u64,
    pub calls_rejected: u64,
    pub time_in_current_state: Duration,
}

impl CircuitBreakerStats {
    pub fn failure_rate(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.total_failures as f64 / self.total_calls as f64
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    half_open_admitted: u32,
    last_failure_time: Option<Instant>,
    state_changed_at: Instant,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            half_open_admitted: 0,
            last_failure_time: None,
            state_changed_at: Instant::now(),
        }
    }

    fn transition_to(&mut self, name: &str, new_state: CircuitState) {
        if self.state == new_state {
            return;
        }
        tracing::info!(
            breaker = name,
            "Circuit breaker state transition: {:?} -> {:?}",
            self.state,
            new_state
        );
        self.state = new_state;
        self.state_changed_at = Instant::now();

        match new_state {
            CircuitState::Closed => {
                self.failure_count = 0;
                self.success_count = 0;
                self.half_open_admitted = 0;
            }
            CircuitState::Open => {
                self.success_count = 0;
                self.half_open_admitted = 0;
            }
            CircuitState::HalfOpen => {
                self.success_count = 0;
                self.half_open_admitted = 0;
            }
        }
    }
}

/// Guards one external dependency
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,

    // Lock-free mirrors of the guarded state
    state: AtomicU8,
    failure_count: AtomicU32,

    total_calls: AtomicU64,
    total_failures: AtomicU64,
    total_successes: AtomicU64,
    calls_rejected: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState::new()),
            state: AtomicU8::new(CircuitState::Closed as u8),
            failure_count: AtomicU32::new(0),
            total_calls: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            total_successes: AtomicU64::new(0),
            calls_rejected: AtomicU64::new(0),
        }
    }

    pub fn from_settings(name: impl Into<String>, settings: &CircuitBreakerSettings) -> Self {
        Self::new(name, CircuitBreakerConfig::from_settings(settings))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::Acquire)
    }

    /// Run `operation` if the circuit admits it
    ///
    /// Every `Err` returned by the operation counts as a failure.
    pub fn execute<T, F>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        self.admit()?;

        let result = operation();
        self.record(result.is_ok());
        result
    }

    /// Force the circuit closed and clear all counters
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.transition_to(&self.name, CircuitState::Closed);
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.half_open_admitted = 0;
        inner.last_failure_time = None;
        self.publish(&inner);
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.lock();
        CircuitBreakerStats {
            current_state: inner.state,
            consecutive_failures: inner.failure_count,
            half_open_successes: inner.success_count,
            total_calls: self.total_calls.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_successes: self.total_successes.load(Ordering::Relaxed),
            calls_rejected: self.calls_rejected.load(Ordering::Relaxed),
            time_in_current_state: inner.state_changed_at.elapsed(),
        }
    }

    fn admit(&self) -> Result<()> {
        let mut inner = self.inner.lock();

        let admitted = match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure_time
                    .map(|t| t.elapsed() >= self.config.reset_timeout)
                    .unwrap_or(true);
                if elapsed {
                    inner.transition_to(&self.name, CircuitState::HalfOpen);
                    inner.half_open_admitted = 1;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_admitted < self.config.half_open_max_requests {
                    inner.half_open_admitted += 1;
                    true
                } else {
                    false
                }
            }
        };

        self.publish(&inner);
        if admitted {
            return Ok(());
        }

        self.calls_rejected.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(breaker = %self.name, state = ?inner.state, "Call rejected by circuit breaker");
        Err(Error::dependency_unavailable(format!(
            "circuit breaker '{}' is {:?}",
            self.name, inner.state
        ))
        .with_context("breaker", &self.name))
    }

    fn record(&self, success: bool) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        if success {
            self.total_successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.total_failures.fetch_add(1, Ordering::Relaxed);
        }

        let mut inner = self.inner.lock();
        match (inner.state, success) {
            (CircuitState::Closed, true) => {
                inner.failure_count = 0;
            }
            (CircuitState::Closed, false) => {
                inner.failure_count += 1;
                inner.last_failure_time = Some(Instant::now());
                if inner.failure_count >= self.config.failure_threshold {
                    tracing::warn!(
                        breaker = %self.name,
                        failures = inner.failure_count,
                        "Failure threshold reached, opening circuit"
                    );
                    inner.transition_to(&self.name, CircuitState::Open);
                }
            }
            (CircuitState::HalfOpen, true) => {
                inner.success_count += 1;
                if inner.success_count >= self.config.half_open_max_requests {
                    inner.transition_to(&self.name, CircuitState::Closed);
                }
            }
            (CircuitState::HalfOpen, false) => {
                inner.failure_count += 1;
                inner.last_failure_time = Some(Instant::now());
                inner.transition_to(&self.name, CircuitState::Open);
            }
            // A call admitted before another thread opened the circuit
            (CircuitState::Open, false) => {
                inner.last_failure_time = Some(Instant::now());
            }
            (CircuitState::Open, true) => {}
        }
        self.publish(&inner);
    }

    fn publish(&self, inner: &BreakerState) {
        self.state.store(inner.state as u8, Ordering::Release);
        self.failure_count.store(inner.failure_count, Ordering::Release);
    }
}
