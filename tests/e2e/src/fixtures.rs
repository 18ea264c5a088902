//! Test fixtures: a sensor producer and payload builders

use crate::framework::TestFramework;
use anyhow::{Context, Result};
use codec::FrameType;
use serde_json::json;
use std::time::Duration;
use transport::{HandshakeServer, HeartbeatHandle, ServerHandle, SharedRegionWriter};
use types::{AlarmPriority, AlarmRaised, AlarmSnapshot};

/// Producer side of the sensor link: ring region, handshake server and
/// optional heartbeat thread
pub struct SensorProducer {
    writer: SharedRegionWriter,
    server: ServerHandle,
    heartbeat: Option<HeartbeatHandle>,
}

impl SensorProducer {
    /// Create the region with the framework's transport geometry and start
    /// serving handshakes on its socket path
    pub fn start(framework: &TestFramework) -> Result<Self> {
        let transport = &framework.settings().transport;
        Self::start_with_geometry(framework, transport.frame_size, transport.frame_count)
    }

    pub fn start_with_geometry(
        framework: &TestFramework,
        frame_size: u32,
        frame_count: u32,
    ) -> Result<Self> {
        let writer = SharedRegionWriter::create(frame_size, frame_count)
            .context("Failed to create ring region")?;
        let handle = writer.share_handle().context("Failed to share region")?;
        let server = HandshakeServer::bind(framework.socket_path(), handle)
            .context("Failed to bind handshake socket")?
            .spawn()
            .context("Failed to start handshake server")?;

        Ok(Self {
            writer,
            server,
            heartbeat: None,
        })
    }

    pub fn start_heartbeat(&mut self, interval: Duration) -> Result<()> {
        self.heartbeat = Some(self.writer.spawn_heartbeat(interval)?);
        Ok(())
    }

    pub fn stop_heartbeat(&mut self) {
        if let Some(mut heartbeat) = self.heartbeat.take() {
            heartbeat.stop();
        }
    }

    pub fn writer(&self) -> &SharedRegionWriter {
        &self.writer
    }

    pub fn handshakes_served(&self) -> u64 {
        self.server.served()
    }

    pub fn write_vitals(&mut self, timestamp_ms: u64, hr: f64, spo2: f64, rr: f64) -> Result<u64> {
        let payload = json!({ "hr": hr, "spo2": spo2, "rr": rr, "signal_quality": 95 });
        let index = self
            .writer
            .write_frame(FrameType::Vitals, timestamp_ms, payload.to_string().as_bytes())?;
        Ok(index)
    }

    pub fn write_waveform(
        &mut self,
        timestamp_ms: u64,
        channel: &str,
        sample_rate: u32,
        values: &[f64],
    ) -> Result<u64> {
        let payload = json!({
            "channel": channel,
            "sample_rate": sample_rate,
            "start_timestamp_ms": timestamp_ms,
            "values": values,
        });
        let index = self
            .writer
            .write_frame(FrameType::Waveform, timestamp_ms, payload.to_string().as_bytes())?;
        Ok(index)
    }

    pub fn stop(&mut self) {
        self.stop_heartbeat();
        self.server.stop();
    }
}

impl Drop for SensorProducer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Alarm fixture for dispatcher scenarios
pub struct AlarmFixture {
    pub alarm_id: String,
    pub value: f64,
    pub threshold: f64,
    pub timestamp_ms: i64,
}

impl AlarmFixture {
    pub fn hr_high(value: f64) -> Self {
        Self {
            alarm_id: format!("ALM-{}", uuid::Uuid::new_v4()),
            value,
            threshold: 120.0,
            timestamp_ms: types::now_millis(),
        }
    }

    pub fn raised(&self, patient_mrn: &str) -> AlarmRaised {
        AlarmRaised {
            alarm: AlarmSnapshot {
                alarm_id: self.alarm_id.clone(),
                alarm_type: "HR_HIGH".to_string(),
                priority: AlarmPriority::High,
                value: self.value,
                threshold: self.threshold,
                patient_mrn: patient_mrn.to_string(),
            },
            timestamp_ms: self.timestamp_ms,
        }
    }
}
