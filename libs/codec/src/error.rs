//! Layout validation errors
//!
//! Each variant carries the expected and observed values so a rejected
//! region or frame can be diagnosed from the log line alone.

use thiserror::Error;
use types::{Error as CoreError, ErrorCode};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// Buffer is too small to contain the expected structure
    #[error("Buffer too small for {context}: need {need} bytes, got {got}")]
    BufferTooSmall {
        need: usize,
        got: usize,
        context: &'static str,
    },

    /// Ring buffer magic mismatch (wrong region or producer not initialised)
    #[error("Invalid ring buffer magic: expected {expected:#010x}, got {actual:#010x}")]
    BadMagic { expected: u32, actual: u32 },

    #[error("Unsupported ring buffer version: expected {expected}, got {actual}")]
    UnsupportedVersion { expected: u32, actual: u32 },

    #[error("Ring buffer header checksum mismatch: stored {stored:#010x}, calculated {calculated:#010x}")]
    HeaderChecksum { stored: u32, calculated: u32 },

    #[error("Invalid ring geometry: frame_size={frame_size}, frame_count={frame_count}")]
    InvalidGeometry { frame_size: u32, frame_count: u32 },

    /// Mapped region shorter than the header-declared geometry
    #[error("Shared region too small: need {need} bytes, mapped {got}")]
    RegionTooSmall { need: usize, got: usize },

    #[error("Frame checksum mismatch (sequence {sequence}): stored {stored:#010x}, calculated {calculated:#010x}")]
    FrameChecksum {
        sequence: u32,
        stored: u32,
        calculated: u32,
    },

    #[error("Unknown frame type {0:#04x}")]
    UnknownFrameType(u8),

    /// Payload does not fit in a slot
    #[error("Frame payload of {size} bytes exceeds slot capacity {capacity}")]
    PayloadTooLarge { size: usize, capacity: usize },

    #[error("Unknown control message type {0:#04x}")]
    UnknownControlType(u8),

    #[error("Socket path of {len} bytes exceeds maximum {max}")]
    SocketPathTooLong { len: usize, max: usize },

    #[error("Socket path is not valid UTF-8")]
    InvalidSocketPath,
}

impl LayoutError {
    /// Whether the error concerns a single frame (drop it) rather than the
    /// whole region (reject the session)
    pub fn is_frame_level(&self) -> bool {
        matches!(
            self,
            LayoutError::FrameChecksum { .. }
                | LayoutError::UnknownFrameType(_)
                | LayoutError::PayloadTooLarge { .. }
        )
    }
}

impl From<LayoutError> for CoreError {
    fn from(err: LayoutError) -> Self {
        let code = if err.is_frame_level() {
            ErrorCode::Internal
        } else {
            ErrorCode::InvalidArgument
        };
        CoreError::new(code, err.to_string())
    }
}
