//! # Resilience Primitives
//!
//! Wrappers for calls to external dependencies (server upload, database
//! writes) that may fail transiently:
//!
//! - [`CircuitBreaker`]: fails fast while a dependency is known to be down
//! - [`RetryPolicy`]: repeats retryable failures with exponential backoff
//!
//! They compose as `retry(breaker(op))`. A breaker rejection carries
//! `ErrorCode::DependencyUnavailable`, which is not retryable, so an open
//! circuit ends the retry loop at once instead of sleeping through it.
//!
//! ```rust,no_run
//! use resilience::{CircuitBreaker, CircuitBreakerConfig, RetryPolicy};
//! use types::Error;
//!
//! let breaker = CircuitBreaker::new("telemetry-upload", CircuitBreakerConfig::default());
//! let retry = RetryPolicy::default();
//!
//! let result: types::Result<()> = retry.execute_with_retry(|| {
//!     breaker.execute(|| Err(Error::unavailable("server unreachable")))
//! });
//! ```
//!
//! Both are `Send + Sync` and meant to be shared through `Arc`.

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState};
pub use retry::RetryPolicy;
