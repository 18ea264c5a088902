//! Full pipeline: producer → shared memory → source → upload → events → telemetry

use monitor_e2e_tests::{
    wait_until, AlarmFixture, MonitoringPipeline, SensorProducer, TestFramework, UploadAck,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use telemetry::{LatencyReport, TelemetryRepository, TelemetryStatus};
use transport::{RingBufferReader, SensorDataSource, SensorSample};
use types::{AlarmRaised, Error, ErrorCode, EventPayload, TelemetryQueued};

fn ack_now() -> UploadAck {
    let now = types::now_millis();
    UploadAck {
        server_received_at: now,
        server_processed_at: now,
        server_ack_at: now,
    }
}

#[test]
fn test_late_attaching_consumer_reads_exactly_one_frame() {
    let framework = TestFramework::new().unwrap();
    let mut producer = SensorProducer::start(&framework).unwrap();
    producer.writer().heartbeat();
    producer.write_vitals(1_000, 72.0, 98.0, 16.0).unwrap();

    let region = transport::RegionConnector::connect(&transport::UnixSocketConnector::from_settings(
        &framework.settings().transport,
    ))
    .unwrap();
    let mut reader =
        RingBufferReader::attach(region, framework.settings().transport.stale_threshold()).unwrap();

    let frames = reader.drain(usize::MAX).unwrap();
    assert_eq!(frames.len(), 1);
    assert_eq!(reader.read_index(), 1);
    assert!(!reader.is_stale());

    // A heartbeat older than the 5000 ms threshold marks the producer stale
    producer
        .writer()
        .heartbeat_at(types::now_millis_u64() - 6_000);
    assert!(reader.is_stale());
    assert!(wait_until(Duration::from_secs(1), || producer.handshakes_served() == 1));
}

#[test]
fn test_samples_flow_to_telemetry_and_events() {
    let framework = TestFramework::new().unwrap();
    let mut producer = SensorProducer::start(&framework).unwrap();
    producer.start_heartbeat(Duration::from_millis(10)).unwrap();

    let mut pipeline = MonitoringPipeline::new(&framework).unwrap();
    pipeline.start().unwrap();
    assert!(wait_until(Duration::from_secs(1), || !pipeline.source.is_stale()));

    let queued = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&queued);
    pipeline
        .dispatcher
        .register_async::<TelemetryQueued, _>(move |e| seen.lock().push(e.clone()));

    let base = types::now_millis_u64();
    producer.write_vitals(base, 80.0, 97.0, 14.0).unwrap();
    producer.write_vitals(base + 1_000, 81.0, 97.0, 15.0).unwrap();
    producer
        .write_waveform(base + 1_000, "ECG_II", 250, &[0.1, 0.2, 0.3, 0.4])
        .unwrap();

    assert!(wait_until(Duration::from_secs(1), || {
        pipeline.ingest().unwrap();
        pipeline.pending_samples().len() >= 10
    }));
    let vitals = pipeline
        .pending_samples()
        .iter()
        .filter(|s| matches!(s, SensorSample::Vital(_)))
        .count();
    assert_eq!(vitals, 6);

    let attempts = AtomicU32::new(0);
    let batch = pipeline
        .upload_batch("MRN-42", |_| {
            if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(Error::unavailable("server busy"))
            } else {
                Ok(ack_now())
            }
        })
        .unwrap();

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(batch.status, TelemetryStatus::Success);
    assert_eq!(batch.retry_count, 1);
    assert_eq!(batch.record_count, 10);
    assert_eq!(batch.data_created_at, Some(base as i64));
    assert!(batch.latency_class.is_some());

    let stored = pipeline.repository.get(&batch.batch_id).unwrap().unwrap();
    assert_eq!(stored, batch);

    pipeline.shutdown();
    let queued = queued.lock();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].batch_id, batch.batch_id);
    assert_eq!(queued[0].vital_count, 6);
}

#[test]
fn test_upload_outage_opens_breaker_and_fails_batch() {
    let mut settings = settings::MonitorSettings::default();
    settings.circuit_breaker.failure_threshold = 2;
    settings.retry.max_retries = 5;
    settings.retry.base_delay_ms = 1;
    settings.retry.max_delay_ms = 2;
    let framework = TestFramework::with_settings(settings).unwrap();

    let mut pipeline = MonitoringPipeline::new(&framework).unwrap();
    let attempts = AtomicU32::new(0);
    let batch = pipeline
        .upload_batch("MRN-7", |_| {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(Error::unavailable("connection refused"))
        })
        .unwrap();

    // Two real attempts open the breaker; the rejection ends the loop
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert!(pipeline.breaker.state().is_open());
    assert_eq!(batch.status, TelemetryStatus::Failed);
    assert_eq!(batch.retry_count, 2);
    assert_eq!(pipeline.repository.get_unsent().unwrap().len(), 1);

    let report = LatencyReport::from_rows(&pipeline.repository.get_unsent().unwrap());
    assert_eq!(report.failed, 1);
    assert_eq!(report.total_retries, 2);
    pipeline.shutdown();
}

#[test]
fn test_upload_timeouts_exhaust_retries() {
    let mut settings = settings::MonitorSettings::default();
    settings.retry.max_retries = 3;
    settings.retry.base_delay_ms = 1;
    settings.retry.max_delay_ms = 1;
    let framework = TestFramework::with_settings(settings).unwrap();

    let mut pipeline = MonitoringPipeline::new(&framework).unwrap();
    let batch = pipeline
        .upload_batch("MRN-8", |_| Err(Error::timeout("no response")))
        .unwrap();

    assert_eq!(batch.status, TelemetryStatus::Timeout);
    assert_eq!(batch.retry_count, 2);
    assert!(batch.error_message.unwrap().contains("3 attempts"));
    assert_eq!(pipeline.breaker.failure_count(), 3);
    pipeline.shutdown();
}

#[test]
fn test_alarm_handlers_sync_and_async() {
    let framework = TestFramework::new().unwrap();
    let pipeline = MonitoringPipeline::new(&framework).unwrap();

    let sync_seen = Arc::new(Mutex::new(Vec::new()));
    let async_seen = Arc::new(AtomicU32::new(0));
    let seen = Arc::clone(&sync_seen);
    pipeline
        .dispatcher
        .register_sync::<AlarmRaised, _>(move |e| seen.lock().push(e.alarm.alarm_id.clone()));
    let counter = Arc::clone(&async_seen);
    pipeline
        .dispatcher
        .register_async::<AlarmRaised, _>(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

    let alarm = AlarmFixture::hr_high(152.0).raised("MRN-42");
    for _ in 0..20 {
        pipeline.dispatcher.dispatch(&alarm.clone().into_event()).unwrap();
    }
    // Synchronous handlers have run by the time dispatch returns
    assert_eq!(sync_seen.lock().len(), 20);

    pipeline.dispatcher.shutdown();
    assert_eq!(async_seen.load(Ordering::SeqCst), 20);

    let err: types::Error = pipeline
        .dispatcher
        .dispatch(&alarm.into_event())
        .unwrap_err()
        .into();
    assert_eq!(err.code, ErrorCode::Conflict);
}

#[test]
fn test_source_reconnects_after_producer_restart() {
    let framework = TestFramework::new().unwrap();
    let mut producer = SensorProducer::start(&framework).unwrap();
    producer.writer().heartbeat();

    let mut pipeline = MonitoringPipeline::new(&framework).unwrap();
    pipeline.start().unwrap();
    producer.write_vitals(1, 60.0, 99.0, 12.0).unwrap();
    assert!(wait_until(Duration::from_secs(1), || {
        pipeline.ingest().unwrap();
        pipeline.pending_samples().len() == 3
    }));

    drop(producer);
    let mut producer = SensorProducer::start(&framework).unwrap();
    producer.writer().heartbeat();
    producer.write_vitals(2, 61.0, 99.0, 12.0).unwrap();

    pipeline.source.reconnect().unwrap();
    assert!(wait_until(Duration::from_secs(1), || {
        pipeline.ingest().unwrap();
        pipeline.pending_samples().len() == 6
    }));
    assert_eq!(pipeline.source.read_index(), Some(1));
    pipeline.shutdown();
}

#[tokio::test]
async fn test_async_retry_around_breaker() {
    let framework = TestFramework::new().unwrap();
    let pipeline = MonitoringPipeline::new(&framework).unwrap();
    let breaker = Arc::clone(&pipeline.breaker);

    let attempts = Arc::new(AtomicU32::new(0));
    let value = pipeline
        .retry
        .execute_with_retry_async(|| {
            let breaker = Arc::clone(&breaker);
            let attempts = Arc::clone(&attempts);
            async move {
                breaker.execute(|| {
                    if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(Error::database("locked"))
                    } else {
                        Ok("stored")
                    }
                })
            }
        })
        .await
        .unwrap();

    assert_eq!(value, "stored");
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert!(breaker.state().is_closed());
}
