//! Structured error type shared across the workspace
//!
//! Every fallible operation in the core returns [`Result<T>`]. An [`Error`]
//! carries a broad [`ErrorCode`], a human-readable message and optional
//! key/value context. Crate-specific error enums (transport, dispatcher,
//! telemetry) convert into it so that callers can wrap any of them in the
//! retry and circuit-breaker primitives.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Generic error categories
///
/// The first group mirrors the categories used by the persistence and
/// network adapters. The last two are produced by the resilience
/// primitives themselves and are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Unknown / unspecified error
    Unknown,
    /// Invalid input parameter or configuration
    InvalidArgument,
    /// Resource already exists
    AlreadyExists,
    /// Resource not found
    NotFound,
    /// Insufficient permissions
    PermissionDenied,
    /// Service or resource temporarily unavailable
    Unavailable,
    /// Operation timed out
    Timeout,
    /// Conflicting state (e.g. concurrent update)
    Conflict,
    /// Database error (locks are transient)
    DatabaseError,
    /// Invariant violation
    Internal,
    /// Circuit breaker rejected the call without invoking the dependency
    DependencyUnavailable,
    /// All retry attempts failed
    RetryExhausted,
}

impl ErrorCode {
    /// Whether an operation failing with this code may succeed if repeated
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::Timeout | ErrorCode::Unavailable | ErrorCode::DatabaseError
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Unknown => "unknown",
            ErrorCode::InvalidArgument => "invalid_argument",
            ErrorCode::AlreadyExists => "already_exists",
            ErrorCode::NotFound => "not_found",
            ErrorCode::PermissionDenied => "permission_denied",
            ErrorCode::Unavailable => "unavailable",
            ErrorCode::Timeout => "timeout",
            ErrorCode::Conflict => "conflict",
            ErrorCode::DatabaseError => "database_error",
            ErrorCode::Internal => "internal",
            ErrorCode::DependencyUnavailable => "dependency_unavailable",
            ErrorCode::RetryExhausted => "retry_exhausted",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key/value context attached to an error (ordered for stable output)
pub type ErrorContext = BTreeMap<String, String>;

/// Structured error information for a failed operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: ErrorContext,
}

/// Result alias used throughout the core
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an error with no context
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    /// Attach a context entry (builder style)
    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    /// Look up a context entry
    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context.get(key).map(String::as_str)
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unavailable, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message)
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    /// Rejection issued by a circuit breaker
    pub fn dependency_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DependencyUnavailable, message)
    }

    /// Aggregated failure after the final retry attempt
    pub fn retry_exhausted(attempts: u32, last: &Error) -> Self {
        Self::new(
            ErrorCode::RetryExhausted,
            format!(
                "operation failed after {} attempts: {}",
                attempts, last.message
            ),
        )
        .with_context("attempts", attempts)
        .with_context("last_error", &last.message)
        .with_context("last_code", last.code)
    }
}
