//! Decoded sensor samples
//!
//! Produced by the transport's data source from vitals and waveform frames.

use serde::{Deserialize, Serialize};

/// One vital-sign measurement (e.g. `HR`, `SPO2`, `RR`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalSample {
    pub vital_type: String,
    pub value: f64,
    pub timestamp_ms: i64,
    /// 0-100, as reported by the sensor
    pub signal_quality: u8,
}

impl VitalSample {
    pub fn new(vital_type: impl Into<String>, value: f64, timestamp_ms: i64, signal_quality: u8) -> Self {
        Self {
            vital_type: vital_type.into(),
            value,
            timestamp_ms,
            signal_quality,
        }
    }
}

/// One waveform sample on a named channel (e.g. `ECG_II`, `PLETH`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveformSample {
    pub channel: String,
    pub value: f64,
    pub timestamp_ms: i64,
    pub sample_rate_hz: u32,
}
