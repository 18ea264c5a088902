//! Persistence of telemetry rows
//!
//! [`TelemetryRepository`] returns the workspace [`types::Result`] so that
//! callers can wrap repository calls in the retry and circuit-breaker
//! primitives. [`InMemoryTelemetryRepository`] backs tests and devices
//! without a database.

use crate::error::TelemetryError;
use crate::metrics::{LatencyThresholds, Stage, TelemetryMetrics, TelemetryStatus};
use dashmap::DashMap;
use tracing::debug;
use types::Result;

pub trait TelemetryRepository: Send + Sync {
    /// Insert a new row; the batch id must be unused
    fn save(&self, metrics: &TelemetryMetrics) -> Result<()>;

    /// Replace an existing row
    fn update(&self, metrics: &TelemetryMetrics) -> Result<()>;

    fn get(&self, batch_id: &str) -> Result<Option<TelemetryMetrics>>;

    /// Rows whose status is not `success`, oldest batch first
    fn get_unsent(&self) -> Result<Vec<TelemetryMetrics>>;

    /// Rows with `batch_created_at` in `[start_ms, end_ms]`, oldest first
    fn get_historical(&self, start_ms: i64, end_ms: i64) -> Result<Vec<TelemetryMetrics>>;

    /// Stamp the transmit and server stages and mark the row `success`
    fn mark_sent(
        &self,
        batch_id: &str,
        transmitted_at: i64,
        server_received_at: i64,
        server_ack_at: i64,
    ) -> Result<()>;

    /// Delete successful rows created before `cutoff_ms`; returns how many
    fn archive(&self, cutoff_ms: i64) -> Result<usize>;
}

#[derive(Debug, Default)]
pub struct InMemoryTelemetryRepository {
    rows: DashMap<String, TelemetryMetrics>,
    thresholds: LatencyThresholds,
}

impl InMemoryTelemetryRepository {
    pub fn new(thresholds: LatencyThresholds) -> Self {
        Self {
            rows: DashMap::new(),
            thresholds,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn collect_sorted<F>(&self, keep: F) -> Vec<TelemetryMetrics>
    where
        F: Fn(&TelemetryMetrics) -> bool,
    {
        let mut rows: Vec<TelemetryMetrics> = self
            .rows
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by(|a, b| {
            a.batch_time()
                .cmp(&b.batch_time())
                .then_with(|| a.batch_id.cmp(&b.batch_id))
        });
        rows
    }
}

impl TelemetryRepository for InMemoryTelemetryRepository {
    fn save(&self, metrics: &TelemetryMetrics) -> Result<()> {
        match self.rows.entry(metrics.batch_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(TelemetryError::Duplicate(metrics.batch_id.clone()).into())
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(metrics.clone());
                debug!(batch_id = %metrics.batch_id, "Saved telemetry batch");
                Ok(())
            }
        }
    }

    fn update(&self, metrics: &TelemetryMetrics) -> Result<()> {
        let mut row = self
            .rows
            .get_mut(&metrics.batch_id)
            .ok_or_else(|| TelemetryError::NotFound(metrics.batch_id.clone()))?;
        *row = metrics.clone();
        Ok(())
    }

    fn get(&self, batch_id: &str) -> Result<Option<TelemetryMetrics>> {
        Ok(self.rows.get(batch_id).map(|row| row.value().clone()))
    }

    fn get_unsent(&self) -> Result<Vec<TelemetryMetrics>> {
        Ok(self.collect_sorted(|row| row.status != TelemetryStatus::Success))
    }

    fn get_historical(&self, start_ms: i64, end_ms: i64) -> Result<Vec<TelemetryMetrics>> {
        Ok(self.collect_sorted(|row| {
            row.batch_created_at
                .is_some_and(|at| start_ms <= at && at <= end_ms)
        }))
    }

    fn mark_sent(
        &self,
        batch_id: &str,
        transmitted_at: i64,
        server_received_at: i64,
        server_ack_at: i64,
    ) -> Result<()> {
        let mut row = self
            .rows
            .get_mut(batch_id)
            .ok_or_else(|| TelemetryError::NotFound(batch_id.to_string()))?;

        // Work on a copy so a rejected stamp leaves the stored row untouched
        let mut updated = row.clone();
        updated.stamp(Stage::Transmitted, transmitted_at)?;
        updated.stamp(Stage::ServerReceived, server_received_at)?;
        updated.stamp(Stage::ServerAck, server_ack_at)?;
        updated.complete(TelemetryStatus::Success, &self.thresholds)?;
        *row = updated;
        Ok(())
    }

    fn archive(&self, cutoff_ms: i64) -> Result<usize> {
        let before = self.rows.len();
        self.rows.retain(|_, row| {
            !(row.status == TelemetryStatus::Success
                && row.batch_created_at.is_some_and(|at| at < cutoff_ms))
        });
        let removed = before.saturating_sub(self.rows.len());
        if removed > 0 {
            debug!(removed, cutoff_ms, "Archived telemetry batches");
        }
        Ok(removed)
    }
}
