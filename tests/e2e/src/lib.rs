//! End-to-End Test Framework
//!
//! Runs a real sensor producer (ring region, handshake socket, heartbeat
//! thread) against the monitor-side pipeline: shared-memory source,
//! circuit breaker and retry around an upload, event dispatch and
//! telemetry latency rows.

pub mod fixtures;
pub mod framework;
pub mod pipeline;

pub use fixtures::{AlarmFixture, SensorProducer};
pub use framework::{init_tracing, wait_until, TestFramework};
pub use pipeline::{MonitoringPipeline, UploadAck};
