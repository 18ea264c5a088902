//! Consumer side of the ring buffer
//!
//! Single consumer, lock-free. The read cursor is held locally: the region
//! is mapped read-only, so the header's `read_index` slot is never written
//! by this process. [`RingBufferReader::read_index`] reports the cursor.
//!
//! ## Read algorithm
//!
//! 1. Load `write_index` (acquire). Nothing to do if it equals the cursor.
//! 2. If the producer is more than `frame_count` frames ahead, skip the
//!    cursor to `write_index - frame_count` and count the skipped frames as
//!    overrun drops.
//! 3. Copy the slot out of shared memory.
//! 4. Reload `write_index`; if the producer lapped the slot during the
//!    copy, drop the copy as an overrun.
//! 5. Validate the frame (CRC, type, sequence). A bad frame is dropped and
//!    counted; the session continues.

use crate::error::{Result, TransportError};
use crate::region::SharedRegion;
use codec::{decode_frame, FrameType, LayoutError, RingBufferHeader};
use std::sync::atomic::{fence, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// A frame copied out of the ring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorFrame {
    pub frame_type: FrameType,
    pub sequence: u32,
    pub timestamp_ms: u64,
    /// Unwrapped ring index the frame was read from
    pub index: u64,
    pub payload: Vec<u8>,
}

/// Consumer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    pub frames_read: u64,
    /// Frames overwritten by the producer before they could be read
    pub frames_dropped_overrun: u64,
    /// Frames that failed CRC or type validation
    pub frames_dropped_corrupt: u64,
}

pub struct RingBufferReader {
    region: SharedRegion,
    header: RingBufferHeader,
    read_index: u64,
    stale_threshold: Duration,
    scratch: Vec<u8>,
    stats: ReaderStats,
}

impl RingBufferReader {
    /// Validate the region header and position the cursor at the oldest
    /// frame still held in the ring
    pub fn attach(region: SharedRegion, stale_threshold: Duration) -> Result<Self> {
        let header = region.header()?;
        header.validate(region.len())?;

        let write_index = region
            .counter(RingBufferHeader::WRITE_INDEX_OFFSET)
            .load(Ordering::Acquire);
        let read_index = write_index.saturating_sub(header.frame_count as u64);

        debug!(
            frame_size = header.frame_size,
            frame_count = header.frame_count,
            write_index,
            read_index,
            "Ring buffer attached"
        );

        Ok(Self {
            scratch: vec![0u8; header.frame_size as usize],
            region,
            header,
            read_index,
            stale_threshold,
            stats: ReaderStats::default(),
        })
    }

    pub fn header(&self) -> &RingBufferHeader {
        &self.header
    }

    /// Next unwrapped index to be consumed
    pub fn read_index(&self) -> u64 {
        self.read_index
    }

    pub fn write_index(&self) -> u64 {
        self.region
            .counter(RingBufferHeader::WRITE_INDEX_OFFSET)
            .load(Ordering::Acquire)
    }

    /// Frames published but not yet consumed (may exceed `frame_count`)
    pub fn available(&self) -> u64 {
        self.write_index().saturating_sub(self.read_index)
    }

    pub fn stats(&self) -> ReaderStats {
        self.stats
    }

    /// Read the next valid frame, if any
    ///
    /// Dropped frames are skipped and counted, so `Ok(None)` always means
    /// the ring is drained.
    pub fn try_read(&mut self) -> Result<Option<SensorFrame>> {
        let frame_count = self.header.frame_count as u64;

        loop {
            let write_index = self.write_index();
            if write_index <= self.read_index {
                return Ok(None);
            }

            let behind = write_index - self.read_index;
            if behind > frame_count {
                let skipped = behind - frame_count;
                self.stats.frames_dropped_overrun += skipped;
                warn!(
                    skipped,
                    read_index = self.read_index,
                    write_index,
                    "Ring buffer overrun, skipping to oldest retained frame"
                );
                self.read_index = write_index - frame_count;
            }

            let index = self.read_index;
            let offset = self.header.slot_offset(index);
            let len = self.scratch.len();
            // SAFETY: validate() guaranteed offset + frame_size <= region len
            unsafe {
                std::ptr::copy_nonoverlapping(
                    self.region.as_ptr().add(offset),
                    self.scratch.as_mut_ptr(),
                    len,
                );
            }

            // Keep the slot reads above from sinking below the re-check
            fence(Ordering::Acquire);

            // Slot `index` is reused by the write of `index + frame_count`
            let write_after = self.write_index();
            let in_flight = write_after.saturating_sub(index) >= frame_count;
            if write_after.saturating_sub(index) > frame_count {
                self.drop_overrun(index, "slot overwritten during copy");
                continue;
            }

            match decode_frame(&self.scratch) {
                Ok(frame) if frame.sequence != index as u32 => {
                    self.drop_overrun(index, "sequence does not match slot index");
                }
                Ok(frame) => {
                    let frame = SensorFrame {
                        frame_type: frame.frame_type,
                        sequence: frame.sequence,
                        timestamp_ms: frame.timestamp_ms,
                        index,
                        payload: frame.payload.to_vec(),
                    };
                    self.read_index = index + 1;
                    self.stats.frames_read += 1;
                    return Ok(Some(frame));
                }
                Err(_) if in_flight => {
                    // Producer was rewriting this slot while we copied it
                    self.drop_overrun(index, "torn slot");
                }
                Err(e) => self.drop_corrupt(index, &e),
            }
        }
    }

    /// Read up to `max_frames` frames
    pub fn drain(&mut self, max_frames: usize) -> Result<Vec<SensorFrame>> {
        let mut frames = Vec::new();
        while frames.len() < max_frames {
            match self.try_read()? {
                Some(frame) => frames.push(frame),
                None => break,
            }
        }
        Ok(frames)
    }

    /// Producer heartbeat, ms since Unix epoch (0 if never written)
    pub fn heartbeat_ms(&self) -> u64 {
        self.region
            .counter(RingBufferHeader::HEARTBEAT_OFFSET)
            .load(Ordering::Acquire)
    }

    /// Heartbeat age at `now_ms`, `None` if no heartbeat was ever written
    pub fn heartbeat_age_at(&self, now_ms: u64) -> Option<u64> {
        match self.heartbeat_ms() {
            0 => None,
            heartbeat => Some(now_ms.saturating_sub(heartbeat)),
        }
    }

    pub fn is_stale_at(&self, now_ms: u64) -> bool {
        match self.heartbeat_age_at(now_ms) {
            Some(age) => age > self.stale_threshold.as_millis() as u64,
            None => true,
        }
    }

    /// Whether the producer heartbeat is older than the stale threshold
    pub fn is_stale(&self) -> bool {
        self.is_stale_at(types::now_millis_u64())
    }

    /// `Err(Stale)` when the producer heartbeat is too old
    pub fn check_liveness(&self) -> Result<()> {
        let now = types::now_millis_u64();
        if self.is_stale_at(now) {
            let age_ms = self.heartbeat_age_at(now).unwrap_or(u64::MAX);
            return Err(TransportError::Stale {
                age_ms,
                threshold_ms: self.stale_threshold.as_millis() as u64,
            });
        }
        Ok(())
    }

    fn drop_overrun(&mut self, index: u64, reason: &'static str) {
        self.stats.frames_dropped_overrun += 1;
        self.read_index = index + 1;
        warn!(index, reason, "Dropped frame overwritten by producer");
    }

    fn drop_corrupt(&mut self, index: u64, err: &LayoutError) {
        self.stats.frames_dropped_corrupt += 1;
        self.read_index = index + 1;
        warn!(index, error = %err, "Dropped corrupt frame");
    }
}

impl std::fmt::Debug for RingBufferReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBufferReader")
            .field("frame_size", &self.header.frame_size)
            .field("frame_count", &self.header.frame_count)
            .field("read_index", &self.read_index)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::SharedRegionWriter;

    fn pair(frame_size: u32, frame_count: u32) -> (SharedRegionWriter, RingBufferReader) {
        let writer = SharedRegionWriter::create(frame_size, frame_count).unwrap();
        let handle = writer.share_handle().unwrap();
        let region = SharedRegion::from_file(handle.file, handle.size as usize).unwrap();
        let reader = RingBufferReader::attach(region, Duration::from_millis(5_000)).unwrap();
        (writer, reader)
    }

    #[test]
    fn test_empty_ring_reads_nothing() {
        let (_writer, mut reader) = pair(128, 4);
        assert_eq!(reader.try_read().unwrap(), None);
        assert_eq!(reader.read_index(), 0);
    }

    #[test]
    fn test_frames_read_in_order() {
        let (mut writer, mut reader) = pair(128, 8);
        for i in 0..5u64 {
            writer
                .write_frame(FrameType::Vitals, 1_000 + i, format!("{{\"hr\":{}}}", 60 + i).as_bytes())
                .unwrap();
        }

        let frames = reader.drain(10).unwrap();
        assert_eq!(frames.len(), 5);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.index, i as u64);
            assert_eq!(frame.timestamp_ms, 1_000 + i as u64);
        }
        assert_eq!(reader.read_index(), 5);
        assert_eq!(reader.stats().frames_read, 5);
    }

    #[test]
    fn test_drain_respects_limit() {
        let (mut writer, mut reader) = pair(64, 16);
        for _ in 0..6 {
            writer.write_frame(FrameType::Heartbeat, 0, &[]).unwrap();
        }
        assert_eq!(reader.drain(4).unwrap().len(), 4);
        assert_eq!(reader.available(), 2);
        assert_eq!(reader.drain(4).unwrap().len(), 2);
    }

    #[test]
    fn test_overrun_skips_and_counts() {
        let (mut writer, mut reader) = pair(64, 4);
        for i in 0..10u64 {
            writer.write_frame(FrameType::Vitals, i, b"{}").unwrap();
        }

        let frames = reader.drain(100).unwrap();
        // Only the last frame_count frames survive
        let indices: Vec<u64> = frames.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![6, 7, 8, 9]);
        assert_eq!(reader.stats().frames_dropped_overrun, 6);
        assert_eq!(reader.read_index(), 10);
    }

    #[test]
    fn test_full_ring_is_read_without_loss() {
        let (mut writer, mut reader) = pair(64, 4);
        for i in 0..4u64 {
            writer.write_frame(FrameType::Vitals, i, b"{}").unwrap();
        }
        assert_eq!(reader.drain(10).unwrap().len(), 4);
        assert_eq!(reader.stats().frames_dropped_overrun, 0);
    }

    #[test]
    fn test_missing_heartbeat_is_stale() {
        let (writer, reader) = pair(64, 4);
        assert!(reader.is_stale());
        assert!(reader.check_liveness().is_err());

        writer.heartbeat();
        assert!(!reader.is_stale());
        assert!(reader.check_liveness().is_ok());
    }

    #[test]
    fn test_stale_threshold_boundary() {
        let (writer, reader) = pair(64, 4);
        writer.heartbeat_at(10_000);
        assert!(!reader.is_stale_at(15_000));
        assert!(reader.is_stale_at(15_001));
        // Clock behind the producer is not stale
        assert!(!reader.is_stale_at(9_000));
    }

    #[test]
    fn test_late_attach_starts_at_oldest_retained() {
        let mut writer = SharedRegionWriter::create(64, 4).unwrap();
        for i in 0..6u64 {
            writer.write_frame(FrameType::Vitals, i, b"{}").unwrap();
        }
        let handle = writer.share_handle().unwrap();
        let region = SharedRegion::from_file(handle.file, handle.size as usize).unwrap();
        let mut reader = RingBufferReader::attach(region, Duration::from_secs(5)).unwrap();

        assert_eq!(reader.read_index(), 2);
        assert_eq!(reader.drain(10).unwrap().len(), 4);
        assert_eq!(reader.stats().frames_dropped_overrun, 0);
    }

    #[test]
    fn test_concurrent_producer_never_yields_mixed_frames() {
        const WRITES: u64 = 20_000;
        let (mut writer, mut reader) = pair(64, 4);

        let producer = std::thread::spawn(move || {
            for i in 0..WRITES {
                writer
                    .write_frame(FrameType::Vitals, i, i.to_string().as_bytes())
                    .unwrap();
            }
        });

        let mut frames = Vec::new();
        loop {
            let done = producer.is_finished();
            frames.extend(reader.drain(usize::MAX).unwrap());
            if done && reader.available() == 0 {
                break;
            }
        }
        producer.join().unwrap();

        for frame in &frames {
            assert_eq!(frame.sequence, frame.index as u32);
            assert_eq!(frame.timestamp_ms, frame.index);
            assert_eq!(frame.payload, frame.index.to_string().into_bytes());
        }
        assert!(frames.windows(2).all(|w| w[0].index < w[1].index));

        let stats = reader.stats();
        assert_eq!(stats.frames_dropped_corrupt, 0);
        assert_eq!(stats.frames_read + stats.frames_dropped_overrun, WRITES);
    }
}
