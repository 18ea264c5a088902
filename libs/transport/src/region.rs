//! Shared Memory Region
//!
//! [`SharedRegion`] is the consumer's read-only view of the producer's ring
//! buffer. It owns the received descriptor (as a `File`) and the mapping;
//! dropping it unmaps the region and closes the descriptor.
//!
//! The three header counters are accessed as `AtomicU64` directly in the
//! mapping. Mappings are page aligned and every counter offset is a
//! multiple of 8, so the reinterpretation is well aligned.

use crate::error::{Result, TransportError};
use codec::RingBufferHeader;
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::os::fd::OwnedFd;
use std::sync::atomic::AtomicU64;

/// Borrow the counter at `offset` of a mapping starting at `base`
///
/// # Safety
///
/// `base + offset .. base + offset + 8` must lie inside a live mapping and
/// `base + offset` must be 8-byte aligned.
pub(crate) unsafe fn atomic_at<'a>(base: *const u8, offset: usize) -> &'a AtomicU64 {
    &*(base.add(offset) as *const AtomicU64)
}

/// Read-only mapping of a ring buffer region
pub struct SharedRegion {
    map: Mmap,
    // Declared after `map`: unmap first, then close
    _file: File,
}

impl SharedRegion {
    /// Map `len` bytes of a received descriptor read-only
    pub fn from_fd(fd: OwnedFd, len: usize) -> Result<Self> {
        Self::from_file(File::from(fd), len)
    }

    /// Map `len` bytes of `file` read-only
    pub fn from_file(file: File, len: usize) -> Result<Self> {
        if len < RingBufferHeader::SIZE {
            return Err(TransportError::configuration(
                format!(
                    "region size {} is smaller than the {}-byte header",
                    len,
                    RingBufferHeader::SIZE
                ),
                Some("ring_buffer_size"),
            ));
        }

        // Touching pages past the end of the file would raise SIGBUS
        let file_len = file
            .metadata()
            .map_err(|e| TransportError::map("Failed to stat shared region", e))?
            .len();
        if file_len < len as u64 {
            return Err(TransportError::configuration(
                format!("region advertises {} bytes but descriptor holds {}", len, file_len),
                Some("ring_buffer_size"),
            ));
        }

        let map = unsafe { MmapOptions::new().len(len).map(&file) }
            .map_err(|e| TransportError::map("Failed to map shared region", e))?;

        Ok(Self { map, _file: file })
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.map
    }

    pub(crate) fn as_ptr(&self) -> *const u8 {
        self.map.as_ptr()
    }

    /// Snapshot of the header as currently stored
    pub fn header(&self) -> Result<RingBufferHeader> {
        Ok(RingBufferHeader::parse(&self.map)?)
    }

    pub(crate) fn counter(&self, offset: usize) -> &AtomicU64 {
        debug_assert!(offset + 8 <= RingBufferHeader::SIZE);
        // SAFETY: offset is one of the header counter offsets, the mapping
        // holds at least the header and is page aligned.
        unsafe { atomic_at(self.as_ptr(), offset) }
    }
}

impl std::fmt::Debug for SharedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRegion")
            .field("len", &self.map.len())
            .finish()
    }
}
