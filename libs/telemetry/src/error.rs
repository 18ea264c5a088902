use crate::metrics::{Stage, TelemetryStatus};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TelemetryError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TelemetryError {
    #[error("{stage} at {at_ms} ms precedes {previous} at {previous_ms} ms")]
    OutOfOrder {
        stage: Stage,
        at_ms: i64,
        previous: Stage,
        previous_ms: i64,
    },

    #[error("{stage} stamped after later stage {latest}")]
    StageRegression { stage: Stage, latest: Stage },

    #[error("{0} already stamped")]
    AlreadyStamped(Stage),

    #[error("status transition {from} -> {to} not allowed")]
    InvalidTransition {
        from: TelemetryStatus,
        to: TelemetryStatus,
    },

    #[error("latency thresholds must satisfy 0 <= excellent <= good <= acceptable")]
    InvalidThresholds,

    #[error("telemetry batch {0} not found")]
    NotFound(String),

    #[error("telemetry batch {0} already exists")]
    Duplicate(String),
}

impl From<TelemetryError> for types::Error {
    fn from(err: TelemetryError) -> Self {
        let message = err.to_string();
        match err {
            TelemetryError::NotFound(batch_id) => {
                types::Error::not_found(message).with_context("batch_id", batch_id)
            }
            TelemetryError::Duplicate(batch_id) => {
                types::Error::new(types::ErrorCode::AlreadyExists, message)
                    .with_context("batch_id", batch_id)
            }
            _ => types::Error::invalid_argument(message),
        }
    }
}
