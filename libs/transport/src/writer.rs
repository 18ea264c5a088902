//! Producer side of the ring buffer
//!
//! [`SharedRegionWriter`] allocates the region, initialises the header and
//! publishes frames. It never blocks and never looks at the consumer: when
//! the consumer falls behind by more than `frame_count` frames, the oldest
//! slots are simply overwritten.
//!
//! Each frame's `sequence` is the low 32 bits of its write index, which lets
//! the consumer recognise a slot that was reused while it was being copied.

use crate::error::{Result, TransportError};
use crate::region::atomic_at;
use codec::{encode_frame, FrameType, RingBufferHeader};
use memmap2::{MmapMut, MmapOptions};
use settings::TransportSettings;
use std::fs::File;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info};
use zerocopy::AsBytes;

/// Writable mapping shared between the writer and its heartbeat thread
struct RegionMemory {
    _map: MmapMut,
    base: NonNull<u8>,
    file: File,
    len: usize,
}

// SAFETY: the mapping lives as long as this struct; all concurrent access
// goes through atomics (counters) or through `&mut SharedRegionWriter`
// (slots).
unsafe impl Send for RegionMemory {}
unsafe impl Sync for RegionMemory {}

impl RegionMemory {
    fn counter(&self, offset: usize) -> &AtomicU64 {
        // SAFETY: counter offsets lie inside the header, mapping is page aligned
        unsafe { atomic_at(self.base.as_ptr(), offset) }
    }
}

/// Descriptor and size handed to consumers during the handshake
#[derive(Debug)]
pub struct RegionHandle {
    pub file: File,
    pub size: u64,
}

pub struct SharedRegionWriter {
    memory: Arc<RegionMemory>,
    header: RingBufferHeader,
}

impl SharedRegionWriter {
    /// Allocate and initialise a region with the given geometry
    pub fn create(frame_size: u32, frame_count: u32) -> Result<Self> {
        let header = RingBufferHeader::new(frame_size, frame_count);
        let len = header.region_size().ok_or_else(|| {
            TransportError::configuration("ring geometry overflows", Some("frame_count"))
        })?;
        header.validate(len)?;

        let file = create_backing_file()?;
        file.set_len(len as u64)
            .map_err(|e| TransportError::map("Failed to size shared region", e))?;

        let mut map = unsafe { MmapOptions::new().len(len).map_mut(&file) }
            .map_err(|e| TransportError::map("Failed to map shared region", e))?;
        map[..RingBufferHeader::SIZE].copy_from_slice(header.as_bytes());

        let base = NonNull::new(map.as_mut_ptr()).ok_or_else(|| {
            TransportError::map(
                "Shared region mapped at null",
                std::io::Error::from(std::io::ErrorKind::Other),
            )
        })?;

        info!(
            frame_size,
            frame_count,
            region_bytes = len,
            "Shared ring buffer region created"
        );

        Ok(Self {
            memory: Arc::new(RegionMemory {
                _map: map,
                base,
                file,
                len,
            }),
            header,
        })
    }

    pub fn from_settings(settings: &TransportSettings) -> Result<Self> {
        Self::create(settings.frame_size, settings.frame_count)
    }

    pub fn header(&self) -> &RingBufferHeader {
        &self.header
    }

    pub fn region_size(&self) -> usize {
        self.memory.len
    }

    pub fn write_index(&self) -> u64 {
        self.memory
            .counter(RingBufferHeader::WRITE_INDEX_OFFSET)
            .load(Ordering::Acquire)
    }

    /// Copy `payload` into the next slot and publish it
    ///
    /// Returns the unwrapped index the frame was written at.
    pub fn write_frame(&mut self, frame_type: FrameType, timestamp_ms: u64, payload: &[u8]) -> Result<u64> {
        let counter = self.memory.counter(RingBufferHeader::WRITE_INDEX_OFFSET);
        // Single producer: nobody else stores this counter
        let index = counter.load(Ordering::Relaxed);
        let offset = self.header.slot_offset(index);
        let frame_size = self.header.frame_size as usize;

        // SAFETY: slot_offset keeps offset + frame_size inside the region;
        // `&mut self` guarantees no other writer touches the slot.
        let slot = unsafe {
            std::slice::from_raw_parts_mut(self.memory.base.as_ptr().add(offset), frame_size)
        };
        encode_frame(slot, frame_type, index as u32, timestamp_ms, payload)?;

        counter.store(index + 1, Ordering::Release);
        Ok(index)
    }

    /// Refresh the heartbeat with the current time
    pub fn heartbeat(&self) {
        self.heartbeat_at(types::now_millis_u64());
    }

    /// Store an explicit heartbeat timestamp (ms since Unix epoch)
    pub fn heartbeat_at(&self, timestamp_ms: u64) {
        self.memory
            .counter(RingBufferHeader::HEARTBEAT_OFFSET)
            .store(timestamp_ms, Ordering::Release);
    }

    /// Duplicate the region descriptor for a consumer
    pub fn share_handle(&self) -> Result<RegionHandle> {
        let file = self
            .memory
            .file
            .try_clone()
            .map_err(|e| TransportError::io("Failed to duplicate region descriptor", e))?;
        Ok(RegionHandle {
            file,
            size: self.memory.len as u64,
        })
    }

    /// Refresh the heartbeat every `interval` on a background thread
    pub fn spawn_heartbeat(&self, interval: Duration) -> Result<HeartbeatHandle> {
        let memory = Arc::clone(&self.memory);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let handle = std::thread::Builder::new()
            .name("ring-heartbeat".to_string())
            .spawn(move || {
                debug!(?interval, "Heartbeat thread started");
                while !stop_flag.load(Ordering::Acquire) {
                    memory
                        .counter(RingBufferHeader::HEARTBEAT_OFFSET)
                        .store(types::now_millis_u64(), Ordering::Release);
                    std::thread::park_timeout(interval);
                }
                debug!("Heartbeat thread stopped");
            })
            .map_err(|e| TransportError::io("Failed to spawn heartbeat thread", e))?;

        Ok(HeartbeatHandle {
            stop,
            handle: Some(handle),
        })
    }
}

impl std::fmt::Debug for SharedRegionWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRegionWriter")
            .field("header", &self.header)
            .field("write_index", &self.write_index())
            .finish()
    }
}

/// Stops the heartbeat thread on `stop()` or drop
pub struct HeartbeatHandle {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl HeartbeatHandle {
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(target_os = "linux")]
fn create_backing_file() -> Result<File> {
    use nix::sys::memfd::{memfd_create, MemFdCreateFlag};

    let fd = memfd_create(c"z-monitor-ring", MemFdCreateFlag::MFD_CLOEXEC).map_err(|e| {
        TransportError::map("memfd_create failed", std::io::Error::from(e))
    })?;
    Ok(File::from(fd))
}

#[cfg(not(target_os = "linux"))]
fn create_backing_file() -> Result<File> {
    // Unlinked temp file: no name left behind, descriptor is the only handle
    tempfile::tempfile().map_err(|e| TransportError::map("Failed to create region file", e))
}
