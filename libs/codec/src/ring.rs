//! Ring Buffer Header
//!
//! The header sits at offset 0 of the shared region and describes the slot
//! geometry that follows it. The producer writes it once when it allocates
//! the region; afterwards only the three 8-byte counters change, and those
//! are accessed as atomics by the transport through the offsets below.
//!
//! ```text
//! ┌──────────────────┬─────────┬─────────┬─────┬─────────────┐
//! │ RingBufferHeader │ slot 0  │ slot 1  │ ... │ slot N-1    │
//! │ (48 bytes)       │ (frame_size bytes each)                │
//! └──────────────────┴─────────┴─────────┴─────┴─────────────┘
//! ```

use crate::checksum::calculate_crc32;
use crate::error::LayoutError;
use crate::frame::FrameHeader;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// "SMRB"
pub const RING_BUFFER_MAGIC: u32 = 0x534D_5242;
pub const RING_BUFFER_VERSION: u32 = 1;

/// Ring Buffer Header (48 bytes)
///
/// Field ordering keeps every u64 on an 8-byte boundary so the counters can
/// be reinterpreted as `AtomicU64` inside a page-aligned mapping.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsBytes, FromBytes, FromZeroes)]
pub struct RingBufferHeader {
    pub magic: u32,       // bytes 0-3
    pub version: u32,     // bytes 4-7
    pub frame_size: u32,  // bytes 8-11, slot size including FrameHeader
    pub frame_count: u32, // bytes 12-15

    // Atomic counters (unwrapped, monotonic)
    pub write_index: u64,         // bytes 16-23, producer-owned
    pub read_index: u64,          // bytes 24-31, consumer-owned
    pub heartbeat_timestamp: u64, // bytes 32-39, ms since Unix epoch

    pub crc32: u32,    // bytes 40-43, CRC32 over bytes 0-15
    pub reserved: u32, // bytes 44-47
}

impl RingBufferHeader {
    pub const SIZE: usize = 48;

    pub const WRITE_INDEX_OFFSET: usize = 16;
    pub const READ_INDEX_OFFSET: usize = 24;
    pub const HEARTBEAT_OFFSET: usize = 32;
    pub const CRC_OFFSET: usize = 40;

    /// Bytes covered by the header checksum (the static geometry)
    pub const CRC_COVERED_LEN: usize = 16;

    /// Create a header for a fresh region with all counters at zero
    pub fn new(frame_size: u32, frame_count: u32) -> Self {
        let mut header = Self {
            magic: RING_BUFFER_MAGIC,
            version: RING_BUFFER_VERSION,
            frame_size,
            frame_count,
            write_index: 0,
            read_index: 0,
            heartbeat_timestamp: 0,
            crc32: 0,
            reserved: 0,
        };
        header.crc32 = header.calculate_crc();
        header
    }

    /// Read a header from the start of `bytes`
    pub fn parse(bytes: &[u8]) -> Result<Self, LayoutError> {
        Self::read_from_prefix(bytes).ok_or(LayoutError::BufferTooSmall {
            need: Self::SIZE,
            got: bytes.len(),
            context: "ring buffer header",
        })
    }

    /// CRC32 over the static geometry fields
    pub fn calculate_crc(&self) -> u32 {
        calculate_crc32(&self.as_bytes()[..Self::CRC_COVERED_LEN])
    }

    /// Total region size implied by the geometry, `None` on overflow
    pub fn region_size(&self) -> Option<usize> {
        (self.frame_size as usize)
            .checked_mul(self.frame_count as usize)?
            .checked_add(Self::SIZE)
    }

    /// Byte offset of the slot holding the frame with unwrapped `index`
    pub fn slot_offset(&self, index: u64) -> usize {
        let slot = (index % self.frame_count.max(1) as u64) as usize;
        Self::SIZE + slot * self.frame_size as usize
    }

    /// Maximum payload a single slot can carry
    pub fn payload_capacity(&self) -> usize {
        (self.frame_size as usize).saturating_sub(FrameHeader::SIZE)
    }

    /// Validate a header read from a region of `mapped_len` bytes
    ///
    /// Checks, in order: magic, version, checksum, geometry, region size.
    /// Any failure means the region must not be trusted.
    pub fn validate(&self, mapped_len: usize) -> Result<(), LayoutError> {
        if self.magic != RING_BUFFER_MAGIC {
            return Err(LayoutError::BadMagic {
                expected: RING_BUFFER_MAGIC,
                actual: self.magic,
            });
        }

        if self.version != RING_BUFFER_VERSION {
            return Err(LayoutError::UnsupportedVersion {
                expected: RING_BUFFER_VERSION,
                actual: self.version,
            });
        }

        let calculated = self.calculate_crc();
        if calculated != self.crc32 {
            return Err(LayoutError::HeaderChecksum {
                stored: self.crc32,
                calculated,
            });
        }

        if self.frame_count == 0 || (self.frame_size as usize) <= FrameHeader::SIZE {
            return Err(LayoutError::InvalidGeometry {
                frame_size: self.frame_size,
                frame_count: self.frame_count,
            });
        }

        let need = self.region_size().ok_or(LayoutError::InvalidGeometry {
            frame_size: self.frame_size,
            frame_count: self.frame_count,
        })?;
        if mapped_len < need {
            return Err(LayoutError::RegionTooSmall {
                need,
                got: mapped_len,
            });
        }

        Ok(())
    }

    /// Assert the documented byte offsets
    ///
    /// The producer and consumer are separate processes, possibly built
    /// separately; a silent layout drift would corrupt every read.
    pub fn verify_layout() {
        assert_eq!(std::mem::size_of::<Self>(), Self::SIZE);
        assert_eq!(std::mem::offset_of!(RingBufferHeader, magic), 0);
        assert_eq!(std::mem::offset_of!(RingBufferHeader, version), 4);
        assert_eq!(std::mem::offset_of!(RingBufferHeader, frame_size), 8);
        assert_eq!(std::mem::offset_of!(RingBufferHeader, frame_count), 12);
        assert_eq!(
            std::mem::offset_of!(RingBufferHeader, write_index),
            Self::WRITE_INDEX_OFFSET
        );
        assert_eq!(
            std::mem::offset_of!(RingBufferHeader, read_index),
            Self::READ_INDEX_OFFSET
        );
        assert_eq!(
            std::mem::offset_of!(RingBufferHeader, heartbeat_timestamp),
            Self::HEARTBEAT_OFFSET
        );
        assert_eq!(
            std::mem::offset_of!(RingBufferHeader, crc32),
            Self::CRC_OFFSET
        );
        assert_eq!(std::mem::offset_of!(RingBufferHeader, reserved), 44);
    }
}
