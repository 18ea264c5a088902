//! Producer/consumer handshake over a real Unix socket

use codec::{FrameType, RingBufferHeader, RING_BUFFER_MAGIC};
use std::io::Write;
use std::os::unix::fs::FileExt;
use std::time::Duration;
use transport::{
    HandshakeServer, RegionConnector, RegionHandle, RingBufferReader, SensorDataSource,
    SensorSample, SharedMemorySensorSource, SharedRegionWriter, TransportError,
    UnixSocketConnector,
};
use zerocopy::AsBytes;

const STALE: Duration = Duration::from_millis(5_000);

fn connector(dir: &tempfile::TempDir) -> UnixSocketConnector {
    UnixSocketConnector::new(dir.path().join("sensor.sock"), Duration::from_secs(2))
}

#[test]
fn test_handshake_passes_descriptor() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = SharedRegionWriter::create(256, 16).unwrap();
    let server = HandshakeServer::bind(dir.path().join("sensor.sock"), writer.share_handle().unwrap()).unwrap();
    let mut server = server.spawn().unwrap();

    writer.heartbeat();
    writer
        .write_frame(FrameType::Vitals, 42, br#"{"hr":80}"#)
        .unwrap();

    let region = connector(&dir).connect().unwrap();
    assert_eq!(region.len(), writer.region_size());

    let mut reader = RingBufferReader::attach(region, STALE).unwrap();
    let frame = reader.try_read().unwrap().expect("one frame");
    assert_eq!(frame.timestamp_ms, 42);
    assert_eq!(frame.payload, br#"{"hr":80}"#);
    assert_eq!(reader.read_index(), 1);
    assert!(!reader.is_stale());

    server.stop();
    assert_eq!(server.served(), 1);
}

#[test]
fn test_connect_refused_is_retryable() {
    let dir = tempfile::tempdir().unwrap();
    let err = connector(&dir).connect().unwrap_err();
    assert!(matches!(err, TransportError::Connect { .. }));
    assert!(err.is_retryable());
}

#[test]
fn test_bad_magic_rejected_before_any_read() {
    let dir = tempfile::tempdir().unwrap();

    let mut header = RingBufferHeader::new(128, 4);
    header.magic = RING_BUFFER_MAGIC ^ 0xFFFF;
    let size = header.region_size().unwrap();

    let mut file = tempfile::tempfile().unwrap();
    file.set_len(size as u64).unwrap();
    file.write_all(header.as_bytes()).unwrap();

    let handle = RegionHandle {
        file,
        size: size as u64,
    };
    let _server = HandshakeServer::bind(dir.path().join("sensor.sock"), handle)
        .unwrap()
        .spawn()
        .unwrap();

    let region = connector(&dir).connect().unwrap();
    let err = RingBufferReader::attach(region, STALE).unwrap_err();
    assert!(err.is_fatal(), "unexpected error {err:?}");
    assert!(err.to_string().contains("magic"));
}

#[test]
fn test_corrupt_frame_dropped_session_continues() {
    let mut writer = SharedRegionWriter::create(128, 8).unwrap();
    writer.write_frame(FrameType::Vitals, 1, br#"{"hr":60}"#).unwrap();
    writer.write_frame(FrameType::Vitals, 2, br#"{"hr":61}"#).unwrap();
    writer.write_frame(FrameType::Vitals, 3, br#"{"hr":62}"#).unwrap();

    // Flip a payload byte of slot 1 through the descriptor
    let handle = writer.share_handle().unwrap();
    let offset = writer.header().slot_offset(1) + 24 + 2;
    handle.file.write_at(b"X", offset as u64).unwrap();

    let region = transport::SharedRegion::from_file(handle.file, handle.size as usize).unwrap();
    let mut reader = RingBufferReader::attach(region, STALE).unwrap();
    let frames = reader.drain(10).unwrap();

    let timestamps: Vec<u64> = frames.iter().map(|f| f.timestamp_ms).collect();
    assert_eq!(timestamps, vec![1, 3]);
    assert_eq!(reader.stats().frames_dropped_corrupt, 1);
    assert_eq!(reader.read_index(), 3);
}

#[test]
fn test_data_source_polls_decoded_samples() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = SharedRegionWriter::create(512, 32).unwrap();
    let _server = HandshakeServer::bind(dir.path().join("sensor.sock"), writer.share_handle().unwrap())
        .unwrap()
        .spawn()
        .unwrap();
    let mut heartbeat = writer.spawn_heartbeat(Duration::from_millis(10)).unwrap();

    let mut source = SharedMemorySensorSource::new(connector(&dir), STALE, 10);
    assert!(source.is_stale());
    source.start().unwrap();
    assert!(source.is_active());

    writer
        .write_frame(FrameType::Vitals, 100, br#"{"hr":72,"spo2":98,"rr":16}"#)
        .unwrap();
    writer
        .write_frame(
            FrameType::Waveform,
            101,
            br#"{"channel":"PLETH","sample_rate":100,"start_timestamp_ms":100,"values":[1.0,2.0]}"#,
        )
        .unwrap();
    writer.write_frame(FrameType::Vitals, 102, b"not json").unwrap();

    let samples = source.poll().unwrap();
    let vitals = samples.iter().filter(|s| matches!(s, SensorSample::Vital(_))).count();
    let waves = samples.iter().filter(|s| matches!(s, SensorSample::Waveform(_))).count();
    assert_eq!((vitals, waves), (3, 2));
    assert_eq!(source.decode_failures(), 1);
    assert_eq!(source.read_index(), Some(3));

    // Heartbeat thread keeps the source fresh
    std::thread::sleep(Duration::from_millis(30));
    assert!(!source.is_stale());

    heartbeat.stop();
    source.stop();
    assert!(!source.is_active());
    assert!(matches!(source.poll(), Err(TransportError::NotConnected(_))));
}

#[test]
fn test_overflowing_waveform_timestamp_skipped_and_counted() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = SharedRegionWriter::create(512, 16).unwrap();
    let _server = HandshakeServer::bind(dir.path().join("sensor.sock"), writer.share_handle().unwrap())
        .unwrap()
        .spawn()
        .unwrap();

    let mut source = SharedMemorySensorSource::new(connector(&dir), STALE, 10);
    source.start().unwrap();

    let overflowing = format!(
        r#"{{"channel":"ECG_II","sample_rate":250,"start_timestamp_ms":{},"values":[0.0,1.0]}}"#,
        i64::MAX
    );
    writer
        .write_frame(FrameType::Waveform, 10, overflowing.as_bytes())
        .unwrap();
    writer
        .write_frame(FrameType::Vitals, 11, br#"{"hr":70,"spo2":99,"rr":14}"#)
        .unwrap();

    let samples = source.poll().unwrap();
    assert_eq!(samples.len(), 3);
    assert!(samples.iter().all(|s| matches!(s, SensorSample::Vital(_))));
    assert_eq!(source.decode_failures(), 1);
    assert_eq!(source.read_index(), Some(2));
}
