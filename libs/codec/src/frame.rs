//! Frame Layout
//!
//! Every ring slot starts with a [`FrameHeader`] followed by `data_size`
//! payload bytes. The frame CRC covers the header bytes before the `crc32`
//! field and the payload, so a torn or overwritten slot is detected on read.

use crate::error::LayoutError;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// Frame payload kind
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum FrameType {
    /// JSON vitals object (`hr`, `spo2`, `rr`, ...)
    Vitals = 1,
    /// JSON waveform block (`channel`, `sample_rate`, `values`, ...)
    Waveform = 2,
    /// Liveness marker, no payload
    Heartbeat = 3,
    Invalid = 0xFF,
}

/// Frame Header (24 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsBytes, FromBytes, FromZeroes)]
pub struct FrameHeader {
    pub frame_type: u8,     // byte 0
    pub reserved: [u8; 3],  // bytes 1-3
    pub sequence: u32,      // bytes 4-7
    pub timestamp_ms: u64,  // bytes 8-15
    pub data_size: u32,     // bytes 16-19
    pub crc32: u32,         // bytes 20-23
}

impl FrameHeader {
    pub const SIZE: usize = 24;
    pub const CRC_OFFSET: usize = 20;

    pub fn frame_type(&self) -> Result<FrameType, LayoutError> {
        FrameType::try_from(self.frame_type).map_err(|e| LayoutError::UnknownFrameType(e.number))
    }

    /// CRC32 over the header prefix and `payload`
    pub fn calculate_crc(&self, payload: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.as_bytes()[..Self::CRC_OFFSET]);
        hasher.update(payload);
        hasher.finalize()
    }
}

/// A validated frame borrowed from a slot copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub frame_type: FrameType,
    pub sequence: u32,
    pub timestamp_ms: u64,
    pub payload: &'a [u8],
}

/// Write a frame into `slot`, returning the number of bytes used
pub fn encode_frame(
    slot: &mut [u8],
    frame_type: FrameType,
    sequence: u32,
    timestamp_ms: u64,
    payload: &[u8],
) -> Result<usize, LayoutError> {
    let capacity = slot.len().saturating_sub(FrameHeader::SIZE);
    if payload.len() > capacity {
        return Err(LayoutError::PayloadTooLarge {
            size: payload.len(),
            capacity,
        });
    }

    let mut header = FrameHeader {
        frame_type: frame_type.into(),
        reserved: [0; 3],
        sequence,
        timestamp_ms,
        data_size: payload.len() as u32,
        crc32: 0,
    };
    header.crc32 = header.calculate_crc(payload);

    let used = FrameHeader::SIZE + payload.len();
    slot[..FrameHeader::SIZE].copy_from_slice(header.as_bytes());
    slot[FrameHeader::SIZE..used].copy_from_slice(payload);
    Ok(used)
}

/// Parse and verify the frame stored in `slot`
pub fn decode_frame(slot: &[u8]) -> Result<Frame<'_>, LayoutError> {
    let header = FrameHeader::read_from_prefix(slot).ok_or(LayoutError::BufferTooSmall {
        need: FrameHeader::SIZE,
        got: slot.len(),
        context: "frame header",
    })?;

    let size = header.data_size as usize;
    let capacity = slot.len() - FrameHeader::SIZE;
    if size > capacity {
        return Err(LayoutError::PayloadTooLarge { size, capacity });
    }

    let payload = &slot[FrameHeader::SIZE..FrameHeader::SIZE + size];
    let calculated = header.calculate_crc(payload);
    if calculated != header.crc32 {
        return Err(LayoutError::FrameChecksum {
            sequence: header.sequence,
            stored: header.crc32,
            calculated,
        });
    }

    Ok(Frame {
        frame_type: header.frame_type()?,
        sequence: header.sequence,
        timestamp_ms: header.timestamp_ms,
        payload,
    })
}
