//! Aggregate latency statistics over a set of telemetry rows

use crate::metrics::{LatencyClass, TelemetryMetrics, TelemetryStatus};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatencyReport {
    pub batches: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub pending: usize,
    pub total_retries: u64,

    pub excellent: usize,
    pub good: usize,
    pub acceptable: usize,
    pub slow: usize,

    /// Over rows with a known end-to-end latency
    pub mean_end_to_end_ms: Option<f64>,
    pub max_end_to_end_ms: Option<i64>,
    /// Longest wait between queueing and transmission
    pub max_queue_wait_ms: Option<i64>,
}

impl LatencyReport {
    pub fn from_rows<'a, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = &'a TelemetryMetrics>,
    {
        let mut report = LatencyReport::default();
        let mut end_to_end_sum = 0i128;
        let mut end_to_end_count = 0usize;

        for row in rows {
            report.batches += 1;
            report.total_retries += u64::from(row.retry_count);

            match row.status {
                TelemetryStatus::Success => report.succeeded += 1,
                TelemetryStatus::Failed => report.failed += 1,
                TelemetryStatus::Timeout => report.timed_out += 1,
                TelemetryStatus::Retrying => report.pending += 1,
            }

            match row.latency_class {
                Some(LatencyClass::Excellent) => report.excellent += 1,
                Some(LatencyClass::Good) => report.good += 1,
                Some(LatencyClass::Acceptable) => report.acceptable += 1,
                Some(LatencyClass::Slow) => report.slow += 1,
                None => {}
            }

            if let Some(ms) = row.end_to_end_latency_ms {
                end_to_end_sum += i128::from(ms);
                end_to_end_count += 1;
                report.max_end_to_end_ms = report.max_end_to_end_ms.max(Some(ms));
            }
            if let Some(wait) = row.latencies.queue_wait_latency_ms {
                report.max_queue_wait_ms = report.max_queue_wait_ms.max(Some(wait));
            }
        }

        if end_to_end_count > 0 {
            report.mean_end_to_end_ms = Some(end_to_end_sum as f64 / end_to_end_count as f64);
        }
        report
    }

    /// Share of batches that ended in `success`
    pub fn success_rate(&self) -> f64 {
        if self.batches == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.batches as f64
        }
    }
}
