//! Monitor-side pipeline assembled from the workspace crates
//!
//! ```text
//! SharedMemorySensorSource ─poll→ samples ─batch→ TelemetryMetrics
//!                                                      │
//!             retry(breaker(upload)) ←─────────────────┘
//!                     │
//!   TelemetryQueued ─dispatch→ DomainEventDispatcher
//! ```

use crate::framework::TestFramework;
use anyhow::{Context, Result};
use events::DomainEventDispatcher;
use resilience::{CircuitBreaker, RetryPolicy};
use std::sync::Arc;
use telemetry::{
    InMemoryTelemetryRepository, LatencyThresholds, Stage, TelemetryMetrics, TelemetryRepository,
    TelemetryStatus,
};
use transport::{SensorDataSource, SensorSample, SharedMemorySensorSource, UnixSocketConnector};
use types::{EventPayload, TelemetryQueued};

/// Server acknowledgement returned by an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadAck {
    pub server_received_at: i64,
    pub server_processed_at: i64,
    pub server_ack_at: i64,
}

pub struct MonitoringPipeline {
    pub source: SharedMemorySensorSource<UnixSocketConnector>,
    pub dispatcher: Arc<DomainEventDispatcher>,
    pub breaker: Arc<CircuitBreaker>,
    pub retry: RetryPolicy,
    pub repository: Arc<InMemoryTelemetryRepository>,
    thresholds: LatencyThresholds,
    device_id: String,
    pending: Vec<SensorSample>,
}

impl MonitoringPipeline {
    pub fn new(framework: &TestFramework) -> Result<Self> {
        let settings = framework.settings();
        let thresholds = LatencyThresholds::from_settings(&settings.telemetry)?;

        Ok(Self {
            source: SharedMemorySensorSource::from_settings(
                UnixSocketConnector::from_settings(&settings.transport),
                &settings.transport,
            ),
            dispatcher: Arc::new(DomainEventDispatcher::new()?),
            breaker: Arc::new(CircuitBreaker::from_settings(
                "telemetry-upload",
                &settings.circuit_breaker,
            )),
            retry: RetryPolicy::from_settings(&settings.retry),
            repository: Arc::new(InMemoryTelemetryRepository::new(thresholds)),
            thresholds,
            device_id: settings.telemetry.device_id.clone(),
            pending: Vec::new(),
        })
    }

    pub fn start(&mut self) -> Result<()> {
        self.source.start().context("Sensor source failed to start")?;
        Ok(())
    }

    /// Poll once and keep the samples for the next batch
    pub fn ingest(&mut self) -> Result<usize> {
        let samples = self.source.poll()?;
        let count = samples.len();
        self.pending.extend(samples);
        Ok(count)
    }

    pub fn pending_samples(&self) -> &[SensorSample] {
        &self.pending
    }

    /// Batch the pending samples and upload them through retry and breaker
    ///
    /// `upload` is called once per attempt with the batch id.
    pub fn upload_batch<U>(&mut self, patient_mrn: &str, mut upload: U) -> Result<TelemetryMetrics>
    where
        U: FnMut(&str) -> types::Result<UploadAck>,
    {
        let samples = std::mem::take(&mut self.pending);
        let data_created_at = samples
            .iter()
            .map(|s| match s {
                SensorSample::Vital(v) => v.timestamp_ms,
                SensorSample::Waveform(w) => w.timestamp_ms,
            })
            .min()
            .unwrap_or_else(types::now_millis);

        let mut batch = TelemetryMetrics::new(&self.device_id, patient_mrn, data_created_at)
            .with_contents(samples.len() as u32, 0);
        let now = types::now_millis().max(data_created_at);
        batch.stamp(Stage::BatchCreated, now)?;
        batch.stamp(Stage::Signed, now)?;
        batch.stamp(Stage::QueuedForTx, now)?;
        self.repository.save(&batch)?;

        let queued = TelemetryQueued {
            batch_id: batch.batch_id.clone(),
            device_id: self.device_id.clone(),
            patient_mrn: patient_mrn.to_string(),
            timestamp_ms: now,
            vital_count: samples
                .iter()
                .filter(|s| matches!(s, SensorSample::Vital(_)))
                .count(),
            alarm_count: 0,
        };
        self.dispatcher.dispatch(&queued.into_event())?;

        let batch_id = batch.batch_id.clone();
        let breaker = Arc::clone(&self.breaker);
        let mut retries = Vec::new();
        let outcome = self.retry.execute_with_retry_notify(
            || breaker.execute(|| upload(&batch_id)),
            |_, err, _| retries.push(err.message.clone()),
        );

        for message in retries {
            batch.record_retry(message)?;
        }

        match outcome {
            Ok(ack) => {
                let transmitted_at = types::now_millis().max(now).min(ack.server_received_at);
                batch.stamp(Stage::Transmitted, transmitted_at)?;
                batch.stamp(Stage::ServerReceived, ack.server_received_at)?;
                batch.stamp(Stage::ServerProcessed, ack.server_processed_at)?;
                batch.stamp(Stage::ServerAck, ack.server_ack_at)?;
                batch.complete(TelemetryStatus::Success, &self.thresholds)?;
            }
            Err(err) => {
                let status = if err.code == types::ErrorCode::Timeout
                    || err.context_value("last_code") == Some("timeout")
                {
                    TelemetryStatus::Timeout
                } else {
                    TelemetryStatus::Failed
                };
                batch.error_message = Some(err.message.clone());
                batch.complete(status, &self.thresholds)?;
            }
        }

        self.repository.update(&batch)?;
        Ok(batch)
    }

    pub fn shutdown(&mut self) {
        self.source.stop();
        self.dispatcher.shutdown();
    }
}
