//! Transport Error Types

use codec::LayoutError;
use thiserror::Error;
use types::{Error as CoreError, ErrorCode};

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

#[derive(Error, Debug)]
pub enum TransportError {
    /// Region or settings are unusable (bad magic/version, bad geometry,
    /// missing socket path). Never retried.
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Control socket unreachable
    #[error("Connect error: {message}")]
    Connect {
        message: String,
        source: Option<std::io::Error>,
    },

    /// Control message exchange failed or was malformed
    #[error("Handshake error: {message}")]
    Handshake {
        message: String,
        source: Option<std::io::Error>,
    },

    /// Creating or mapping the shared region failed
    #[error("Map error: {message}")]
    Map {
        message: String,
        source: std::io::Error,
    },

    /// A single frame failed validation
    #[error("Integrity error: {0}")]
    Integrity(LayoutError),

    /// Producer heartbeat older than the threshold
    #[error("Sensor source stale: heartbeat age {age_ms}ms exceeds {threshold_ms}ms")]
    Stale { age_ms: u64, threshold_ms: u64 },

    /// Operation requires an attached region
    #[error("Not connected: {0}")]
    NotConnected(&'static str),

    #[error("I/O error: {message}")]
    Io {
        message: String,
        source: std::io::Error,
    },
}

/// A frame that passed its CRC but could not be turned into samples
#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("Malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Timestamp out of range: {0}")]
    TimestampOutOfRange(&'static str),
}

impl TransportError {
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }

    pub fn connect(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Connect {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn handshake(message: impl Into<String>) -> Self {
        Self::Handshake {
            message: message.into(),
            source: None,
        }
    }

    pub fn handshake_with_source(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Handshake {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn map(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Map {
            message: message.into(),
            source,
        }
    }

    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Connect { .. } => true,
            TransportError::Handshake { .. } => true,
            TransportError::Stale { .. } => true,
            TransportError::NotConnected(_) => true,
            TransportError::Io { .. } => true,
            TransportError::Configuration { .. } => false,
            TransportError::Map { .. } => false,
            TransportError::Integrity(_) => false,
        }
    }

    /// Whether the session must be abandoned
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransportError::Configuration { .. } | TransportError::Map { .. }
        )
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            TransportError::Configuration { .. } => ErrorCode::InvalidArgument,
            TransportError::Connect { .. }
            | TransportError::Handshake { .. }
            | TransportError::Stale { .. }
            | TransportError::NotConnected(_)
            | TransportError::Io { .. } => ErrorCode::Unavailable,
            TransportError::Map { .. } | TransportError::Integrity(_) => ErrorCode::Internal,
        }
    }
}

impl From<LayoutError> for TransportError {
    fn from(err: LayoutError) -> Self {
        if err.is_frame_level() {
            TransportError::Integrity(err)
        } else {
            TransportError::configuration(err.to_string(), None)
        }
    }
}

impl From<TransportError> for CoreError {
    fn from(err: TransportError) -> Self {
        let code = err.code();
        let mut core = CoreError::new(code, err.to_string());
        if let TransportError::Configuration {
            field: Some(field), ..
        } = &err
        {
            core = core.with_context("field", field);
        }
        core
    }
}
