//! # Telemetry Latency
//!
//! Tracks how long each batch of vitals takes to travel from capture to
//! server acknowledgement, one [`TelemetryMetrics`] row per batch.
//!
//! - [`metrics`]: the row, its eight ordered stage timestamps, derived
//!   per-stage latencies and the status machine
//!   (`retrying → success | failed | timeout`)
//! - [`repository`]: [`TelemetryRepository`] persistence interface and an
//!   in-memory implementation
//! - [`report`]: [`LatencyReport`] aggregation for dashboards and alerting

pub mod error;
pub mod metrics;
pub mod report;
pub mod repository;

pub use error::TelemetryError;
pub use metrics::{
    LatencyClass, LatencyThresholds, Stage, StageLatencies, TelemetryMetrics, TelemetryStatus,
};
pub use report::LatencyReport;
pub use repository::{InMemoryTelemetryRepository, TelemetryRepository};
