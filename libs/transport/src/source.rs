//! Sensor data source
//!
//! [`SensorDataSource`] is what the monitoring service consumes: start it,
//! poll it for decoded samples, ask whether it is stale, stop it.
//! [`SharedMemorySensorSource`] implements it over any [`RegionConnector`].
//!
//! Frame payloads are JSON:
//!
//! ```text
//! Vitals:   {"hr": 72, "spo2": 98, "rr": 16, "signal_quality": 95}
//! Waveform: {"channel": "ECG_II", "sample_rate": 250,
//!            "start_timestamp_ms": 1700000000000, "values": [0.1, 0.2]}
//! ```
//!
//! A payload that fails to decode is logged and skipped; it does not end
//! the session.

use crate::connector::RegionConnector;
use crate::error::{PayloadError, Result, TransportError};
use crate::reader::{ReaderStats, RingBufferReader, SensorFrame};
use codec::FrameType;
use serde::Deserialize;
use settings::TransportSettings;
use std::time::Duration;
use tracing::{debug, info, warn};
use types::{VitalSample, WaveformSample};

const DEFAULT_SIGNAL_QUALITY: u8 = 100;
const DEFAULT_SAMPLE_RATE_HZ: u32 = 250;

/// A decoded sample delivered by a data source
#[derive(Debug, Clone, PartialEq)]
pub enum SensorSample {
    Vital(VitalSample),
    Waveform(WaveformSample),
}

/// Static description of a source, for logs and diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    pub name: String,
    pub source_type: &'static str,
    pub endpoint: String,
    pub active: bool,
}

pub trait SensorDataSource: Send {
    /// Connect and validate; fatal errors must not be retried
    fn start(&mut self) -> Result<()>;

    /// Release the region (unmap and close the descriptor)
    fn stop(&mut self);

    fn is_active(&self) -> bool;

    /// Read and decode up to one poll's worth of frames
    fn poll(&mut self) -> Result<Vec<SensorSample>>;

    /// Whether the producer stopped refreshing its heartbeat
    fn is_stale(&self) -> bool;

    fn info(&self) -> SourceInfo;
}

#[derive(Debug, Deserialize)]
struct VitalsPayload {
    hr: Option<f64>,
    spo2: Option<f64>,
    rr: Option<f64>,
    signal_quality: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct WaveformPayload {
    channel: String,
    sample_rate: Option<u32>,
    start_timestamp_ms: i64,
    #[serde(default)]
    values: Vec<f64>,
}

/// Decode one frame into zero or more samples
pub fn decode_samples(frame: &SensorFrame) -> std::result::Result<Vec<SensorSample>, PayloadError> {
    match frame.frame_type {
        FrameType::Vitals => {
            let payload: VitalsPayload = serde_json::from_slice(&frame.payload)?;
            let quality = payload.signal_quality.unwrap_or(DEFAULT_SIGNAL_QUALITY);
            let timestamp_ms = i64::try_from(frame.timestamp_ms)
                .map_err(|_| PayloadError::TimestampOutOfRange("frame timestamp"))?;

            let samples = [("HR", payload.hr), ("SPO2", payload.spo2), ("RR", payload.rr)]
                .into_iter()
                .filter_map(|(name, value)| {
                    value.map(|v| SensorSample::Vital(VitalSample::new(name, v, timestamp_ms, quality)))
                })
                .collect();
            Ok(samples)
        }
        FrameType::Waveform => {
            let payload: WaveformPayload = serde_json::from_slice(&frame.payload)?;
            let rate = payload
                .sample_rate
                .filter(|r| *r > 0)
                .unwrap_or(DEFAULT_SAMPLE_RATE_HZ);

            payload
                .values
                .iter()
                .enumerate()
                .map(|(i, value)| {
                    (i as i64)
                        .checked_mul(1000)
                        .and_then(|ms| payload.start_timestamp_ms.checked_add(ms / rate as i64))
                        .map(|timestamp_ms| {
                            SensorSample::Waveform(WaveformSample {
                                channel: payload.channel.clone(),
                                value: *value,
                                timestamp_ms,
                                sample_rate_hz: rate,
                            })
                        })
                        .ok_or(PayloadError::TimestampOutOfRange("waveform sample timestamp"))
                })
                .collect()
        }
        FrameType::Heartbeat | FrameType::Invalid => Ok(Vec::new()),
    }
}

/// Shared-memory sensor source over a pluggable handshake
pub struct SharedMemorySensorSource<C: RegionConnector> {
    connector: C,
    reader: Option<RingBufferReader>,
    stale_threshold: Duration,
    max_frames_per_poll: usize,
    decode_failures: u64,
}

impl<C: RegionConnector> SharedMemorySensorSource<C> {
    pub fn new(connector: C, stale_threshold: Duration, max_frames_per_poll: usize) -> Self {
        Self {
            connector,
            reader: None,
            stale_threshold,
            max_frames_per_poll: max_frames_per_poll.max(1),
            decode_failures: 0,
        }
    }

    pub fn from_settings(connector: C, settings: &TransportSettings) -> Self {
        Self::new(
            connector,
            settings.stale_threshold(),
            settings.max_frames_per_poll,
        )
    }

    /// Reader counters, `None` when not connected
    pub fn reader_stats(&self) -> Option<ReaderStats> {
        self.reader.as_ref().map(RingBufferReader::stats)
    }

    pub fn read_index(&self) -> Option<u64> {
        self.reader.as_ref().map(RingBufferReader::read_index)
    }

    /// Payloads that passed CRC but could not be decoded into samples
    pub fn decode_failures(&self) -> u64 {
        self.decode_failures
    }

    /// Drop the current region and handshake again
    pub fn reconnect(&mut self) -> Result<()> {
        self.stop();
        self.start()
    }
}

impl<C: RegionConnector> SensorDataSource for SharedMemorySensorSource<C> {
    fn start(&mut self) -> Result<()> {
        if self.reader.is_some() {
            return Ok(());
        }

        let region = self.connector.connect()?;
        let reader = RingBufferReader::attach(region, self.stale_threshold)?;
        info!(
            endpoint = %self.connector.endpoint(),
            read_index = reader.read_index(),
            "Shared memory sensor source started"
        );
        self.reader = Some(reader);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(reader) = self.reader.take() {
            let stats = reader.stats();
            info!(
                frames_read = stats.frames_read,
                dropped_overrun = stats.frames_dropped_overrun,
                dropped_corrupt = stats.frames_dropped_corrupt,
                "Shared memory sensor source stopped"
            );
        }
    }

    fn is_active(&self) -> bool {
        self.reader.is_some()
    }

    fn poll(&mut self) -> Result<Vec<SensorSample>> {
        let reader = self
            .reader
            .as_mut()
            .ok_or(TransportError::NotConnected("sensor source not started"))?;

        let frames = reader.drain(self.max_frames_per_poll)?;
        let mut samples = Vec::with_capacity(frames.len() * 3);
        for frame in &frames {
            match decode_samples(frame) {
                Ok(decoded) => samples.extend(decoded),
                Err(e) => {
                    self.decode_failures += 1;
                    warn!(
                        index = frame.index,
                        frame_type = ?frame.frame_type,
                        error = %e,
                        "Failed to decode frame payload"
                    );
                }
            }
        }

        if !frames.is_empty() {
            debug!(frames = frames.len(), samples = samples.len(), "Polled sensor frames");
        }
        Ok(samples)
    }

    fn is_stale(&self) -> bool {
        match &self.reader {
            Some(reader) => reader.is_stale(),
            None => true,
        }
    }

    fn info(&self) -> SourceInfo {
        SourceInfo {
            name: "Shared Memory Sensor".to_string(),
            source_type: "SharedMemory",
            endpoint: self.connector.endpoint(),
            active: self.is_active(),
        }
    }
}

impl<C: RegionConnector> Drop for SharedMemorySensorSource<C> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(frame_type: FrameType, timestamp_ms: u64, payload: &str) -> SensorFrame {
        SensorFrame {
            frame_type,
            sequence: 0,
            timestamp_ms,
            index: 0,
            payload: payload.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_decode_vitals() {
        let samples = decode_samples(&frame(
            FrameType::Vitals,
            1_000,
            r#"{"hr":72,"spo2":98,"signal_quality":90}"#,
        ))
        .unwrap();

        assert_eq!(
            samples,
            vec![
                SensorSample::Vital(VitalSample::new("HR", 72.0, 1_000, 90)),
                SensorSample::Vital(VitalSample::new("SPO2", 98.0, 1_000, 90)),
            ]
        );
    }

    #[test]
    fn test_vitals_default_signal_quality() {
        let samples = decode_samples(&frame(FrameType::Vitals, 5, r#"{"rr":16}"#)).unwrap();
        match &samples[0] {
            SensorSample::Vital(v) => {
                assert_eq!(v.vital_type, "RR");
                assert_eq!(v.signal_quality, 100);
            }
            other => panic!("unexpected sample {other:?}"),
        }
    }

    #[test]
    fn test_decode_waveform_timestamps() {
        let samples = decode_samples(&frame(
            FrameType::Waveform,
            0,
            r#"{"channel":"ECG_II","sample_rate":250,"start_timestamp_ms":1000,"values":[0.1,0.2,0.3]}"#,
        ))
        .unwrap();

        let timestamps: Vec<i64> = samples
            .iter()
            .map(|s| match s {
                SensorSample::Waveform(w) => w.timestamp_ms,
                SensorSample::Vital(_) => -1,
            })
            .collect();
        assert_eq!(timestamps, vec![1000, 1004, 1008]);
    }

    #[test]
    fn test_heartbeat_frame_has_no_samples() {
        assert!(decode_samples(&frame(FrameType::Heartbeat, 0, "")).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(matches!(
            decode_samples(&frame(FrameType::Vitals, 0, "{not json")),
            Err(PayloadError::Json(_))
        ));
    }

    #[test]
    fn test_waveform_timestamp_overflow_is_an_error() {
        let payload = format!(
            r#"{{"channel":"ECG_II","sample_rate":250,"start_timestamp_ms":{},"values":[0.0,1.0]}}"#,
            i64::MAX
        );
        assert!(matches!(
            decode_samples(&frame(FrameType::Waveform, 0, &payload)),
            Err(PayloadError::TimestampOutOfRange(_))
        ));

        // The first sample sits exactly at the start timestamp
        let payload = format!(
            r#"{{"channel":"ECG_II","sample_rate":250,"start_timestamp_ms":{},"values":[0.5]}}"#,
            i64::MAX
        );
        let samples = decode_samples(&frame(FrameType::Waveform, 0, &payload)).unwrap();
        assert_eq!(samples.len(), 1);
    }

    #[test]
    fn test_vitals_timestamp_beyond_i64_is_an_error() {
        assert!(matches!(
            decode_samples(&frame(FrameType::Vitals, u64::MAX, r#"{"hr":72}"#)),
            Err(PayloadError::TimestampOutOfRange(_))
        ));
    }
}
