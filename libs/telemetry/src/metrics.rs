//! Telemetry batch latency record
//!
//! One [`TelemetryMetrics`] row follows a batch of vitals from the moment
//! the first sample was captured to the server acknowledgement:
//!
//! ```text
//! data_created → batch_created → signed → queued_for_tx → transmitted
//!   → server_received → server_processed → server_ack
//! ```
//!
//! Stages are stamped in that order. A stage may be skipped (a server that
//! does not report processing time leaves `server_processed_at` unset) but
//! never stamped after a later one, and no timestamp may be earlier than
//! the one before it. Equal timestamps are allowed.

use crate::error::{Result, TelemetryError};
use serde::{Deserialize, Serialize};
use settings::TelemetrySettings;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    DataCreated,
    BatchCreated,
    Signed,
    QueuedForTx,
    Transmitted,
    ServerReceived,
    ServerProcessed,
    ServerAck,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Stage::DataCreated,
        Stage::BatchCreated,
        Stage::Signed,
        Stage::QueuedForTx,
        Stage::Transmitted,
        Stage::ServerReceived,
        Stage::ServerProcessed,
        Stage::ServerAck,
    ];

    /// Persisted column holding this stage's timestamp
    pub fn column(&self) -> &'static str {
        match self {
            Stage::DataCreated => "data_created_at",
            Stage::BatchCreated => "batch_created_at",
            Stage::Signed => "signed_at",
            Stage::QueuedForTx => "queued_for_tx_at",
            Stage::Transmitted => "transmitted_at",
            Stage::ServerReceived => "server_received_at",
            Stage::ServerProcessed => "server_processed_at",
            Stage::ServerAck => "server_ack_at",
        }
    }

    pub fn previous(&self) -> Option<Stage> {
        let index = *self as usize;
        index.checked_sub(1).map(|i| Stage::ALL[i])
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryStatus {
    Retrying,
    Success,
    Failed,
    Timeout,
}

impl TelemetryStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TelemetryStatus::Retrying)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TelemetryStatus::Retrying => "retrying",
            TelemetryStatus::Success => "success",
            TelemetryStatus::Failed => "failed",
            TelemetryStatus::Timeout => "timeout",
        }
    }
}

impl fmt::Display for TelemetryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyClass {
    Excellent,
    Good,
    Acceptable,
    Slow,
}

/// Upper bounds (inclusive, milliseconds) of each latency class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyThresholds {
    excellent_max_ms: i64,
    good_max_ms: i64,
    acceptable_max_ms: i64,
}

impl Default for LatencyThresholds {
    fn default() -> Self {
        Self {
            excellent_max_ms: 1_000,
            good_max_ms: 5_000,
            acceptable_max_ms: 15_000,
        }
    }
}

impl LatencyThresholds {
    pub fn new(excellent_max_ms: i64, good_max_ms: i64, acceptable_max_ms: i64) -> Result<Self> {
        if !(0 <= excellent_max_ms && excellent_max_ms <= good_max_ms && good_max_ms <= acceptable_max_ms) {
            return Err(TelemetryError::InvalidThresholds);
        }
        Ok(Self {
            excellent_max_ms,
            good_max_ms,
            acceptable_max_ms,
        })
    }

    pub fn from_settings(settings: &TelemetrySettings) -> Result<Self> {
        Self::new(
            settings.excellent_max_ms,
            settings.good_max_ms,
            settings.acceptable_max_ms,
        )
    }

    pub fn classify(&self, end_to_end_ms: i64) -> LatencyClass {
        if end_to_end_ms <= self.excellent_max_ms {
            LatencyClass::Excellent
        } else if end_to_end_ms <= self.good_max_ms {
            LatencyClass::Good
        } else if end_to_end_ms <= self.acceptable_max_ms {
            LatencyClass::Acceptable
        } else {
            LatencyClass::Slow
        }
    }
}

/// Latency of each stage, measured from the stage before it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageLatencies {
    pub batch_creation_latency_ms: Option<i64>,
    pub signing_latency_ms: Option<i64>,
    pub queue_latency_ms: Option<i64>,
    /// Time spent waiting in the transmit queue (backpressure signal)
    pub queue_wait_latency_ms: Option<i64>,
    pub network_latency_ms: Option<i64>,
    pub server_processing_latency_ms: Option<i64>,
    pub server_ack_latency_ms: Option<i64>,
}

impl StageLatencies {
    /// Latencies in stage order, `BatchCreated` first
    pub fn as_array(&self) -> [Option<i64>; 7] {
        [
            self.batch_creation_latency_ms,
            self.signing_latency_ms,
            self.queue_latency_ms,
            self.queue_wait_latency_ms,
            self.network_latency_ms,
            self.server_processing_latency_ms,
            self.server_ack_latency_ms,
        ]
    }

    fn slot_mut(&mut self, stage: Stage) -> Option<&mut Option<i64>> {
        match stage {
            Stage::DataCreated => None,
            Stage::BatchCreated => Some(&mut self.batch_creation_latency_ms),
            Stage::Signed => Some(&mut self.signing_latency_ms),
            Stage::QueuedForTx => Some(&mut self.queue_latency_ms),
            Stage::Transmitted => Some(&mut self.queue_wait_latency_ms),
            Stage::ServerReceived => Some(&mut self.network_latency_ms),
            Stage::ServerProcessed => Some(&mut self.server_processing_latency_ms),
            Stage::ServerAck => Some(&mut self.server_ack_latency_ms),
        }
    }
}

/// One row of `telemetry_metrics`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryMetrics {
    pub batch_id: String,
    pub device_id: String,
    pub patient_mrn: String,
    pub record_count: u32,
    pub batch_size_bytes: u64,

    pub data_created_at: Option<i64>,
    pub batch_created_at: Option<i64>,
    pub signed_at: Option<i64>,
    pub queued_for_tx_at: Option<i64>,
    pub transmitted_at: Option<i64>,
    pub server_received_at: Option<i64>,
    pub server_processed_at: Option<i64>,
    pub server_ack_at: Option<i64>,

    #[serde(flatten)]
    pub latencies: StageLatencies,
    pub end_to_end_latency_ms: Option<i64>,

    pub status: TelemetryStatus,
    pub retry_count: u32,
    pub latency_class: Option<LatencyClass>,
    pub error_message: Option<String>,
}

impl TelemetryMetrics {
    /// Start tracking a new batch with a random v4 batch id
    pub fn new(
        device_id: impl Into<String>,
        patient_mrn: impl Into<String>,
        data_created_at: i64,
    ) -> Self {
        Self::with_batch_id(
            uuid::Uuid::new_v4().to_string(),
            device_id,
            patient_mrn,
            data_created_at,
        )
    }

    pub fn with_batch_id(
        batch_id: impl Into<String>,
        device_id: impl Into<String>,
        patient_mrn: impl Into<String>,
        data_created_at: i64,
    ) -> Self {
        Self {
            batch_id: batch_id.into(),
            device_id: device_id.into(),
            patient_mrn: patient_mrn.into(),
            record_count: 0,
            batch_size_bytes: 0,
            data_created_at: Some(data_created_at),
            batch_created_at: None,
            signed_at: None,
            queued_for_tx_at: None,
            transmitted_at: None,
            server_received_at: None,
            server_processed_at: None,
            server_ack_at: None,
            latencies: StageLatencies::default(),
            end_to_end_latency_ms: None,
            status: TelemetryStatus::Retrying,
            retry_count: 0,
            latency_class: None,
            error_message: None,
        }
    }

    pub fn with_contents(mut self, record_count: u32, batch_size_bytes: u64) -> Self {
        self.record_count = record_count;
        self.batch_size_bytes = batch_size_bytes;
        self
    }

    pub fn timestamp(&self, stage: Stage) -> Option<i64> {
        match stage {
            Stage::DataCreated => self.data_created_at,
            Stage::BatchCreated => self.batch_created_at,
            Stage::Signed => self.signed_at,
            Stage::QueuedForTx => self.queued_for_tx_at,
            Stage::Transmitted => self.transmitted_at,
            Stage::ServerReceived => self.server_received_at,
            Stage::ServerProcessed => self.server_processed_at,
            Stage::ServerAck => self.server_ack_at,
        }
    }

    fn timestamp_mut(&mut self, stage: Stage) -> &mut Option<i64> {
        match stage {
            Stage::DataCreated => &mut self.data_created_at,
            Stage::BatchCreated => &mut self.batch_created_at,
            Stage::Signed => &mut self.signed_at,
            Stage::QueuedForTx => &mut self.queued_for_tx_at,
            Stage::Transmitted => &mut self.transmitted_at,
            Stage::ServerReceived => &mut self.server_received_at,
            Stage::ServerProcessed => &mut self.server_processed_at,
            Stage::ServerAck => &mut self.server_ack_at,
        }
    }

    /// Latest stage stamped so far, with its timestamp
    pub fn latest_stage(&self) -> Option<(Stage, i64)> {
        Stage::ALL
            .iter()
            .rev()
            .find_map(|stage| self.timestamp(*stage).map(|at| (*stage, at)))
    }

    /// Record that `stage` was reached at `at_ms`
    pub fn stamp(&mut self, stage: Stage, at_ms: i64) -> Result<()> {
        if self.timestamp(stage).is_some() {
            return Err(TelemetryError::AlreadyStamped(stage));
        }
        if let Some((latest, latest_ms)) = self.latest_stage() {
            if latest > stage {
                return Err(TelemetryError::StageRegression { stage, latest });
            }
            if at_ms < latest_ms {
                return Err(TelemetryError::OutOfOrder {
                    stage,
                    at_ms,
                    previous: latest,
                    previous_ms: latest_ms,
                });
            }
        }

        *self.timestamp_mut(stage) = Some(at_ms);

        if let Some(previous_ms) = stage.previous().and_then(|p| self.timestamp(p)) {
            if let Some(slot) = self.latencies.slot_mut(stage) {
                *slot = Some(at_ms - previous_ms);
            }
        }
        if let (Some(start), Some(ack)) = (self.data_created_at, self.server_ack_at) {
            self.end_to_end_latency_ms = Some(ack - start);
        }
        Ok(())
    }

    /// Count one retry of the upload and remember why it failed
    pub fn record_retry(&mut self, error_message: impl Into<String>) -> Result<()> {
        if self.status.is_terminal() {
            return Err(TelemetryError::InvalidTransition {
                from: self.status,
                to: TelemetryStatus::Retrying,
            });
        }
        self.retry_count += 1;
        self.error_message = Some(error_message.into());
        Ok(())
    }

    /// Move to a terminal status and classify the end-to-end latency
    pub fn complete(&mut self, status: TelemetryStatus, thresholds: &LatencyThresholds) -> Result<()> {
        if self.status.is_terminal() || !status.is_terminal() {
            return Err(TelemetryError::InvalidTransition {
                from: self.status,
                to: status,
            });
        }
        self.status = status;
        if status == TelemetryStatus::Success {
            self.error_message = None;
        }
        self.latency_class = self.end_to_end_latency_ms.map(|ms| thresholds.classify(ms));

        tracing::debug!(
            batch_id = %self.batch_id,
            status = %status,
            end_to_end_ms = ?self.end_to_end_latency_ms,
            retries = self.retry_count,
            "Telemetry batch completed"
        );
        Ok(())
    }

    /// Sort key used for reporting queries
    pub fn batch_time(&self) -> i64 {
        self.batch_created_at
            .or(self.data_created_at)
            .unwrap_or_default()
    }
}
