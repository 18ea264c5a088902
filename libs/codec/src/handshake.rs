//! Handshake Control Message
//!
//! Sent once by the producer to each consumer that connects to the control
//! socket. The shared-memory descriptor itself travels as `SCM_RIGHTS`
//! ancillary data alongside these bytes, never inside them.
//!
//! ```text
//! ┌──────┬──────────────────────┬───────────────────────────────┐
//! │ type │ ring_buffer_size (LE)│ socket_path (NUL padded)      │
//! │ 1 B  │ 8 B                  │ 108 B                         │
//! └──────┴──────────────────────┴───────────────────────────────┘
//! ```

use crate::error::LayoutError;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::io::{Cursor, Read, Write};

/// Same capacity as `sockaddr_un.sun_path`
pub const SOCKET_PATH_LEN: usize = 108;

pub const DEFAULT_SOCKET_PATH: &str = "/tmp/z-monitor-sensor.sock";

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum ControlMessageType {
    Handshake = 1,
    Heartbeat = 2,
    Shutdown = 3,
    Error = 0xFF,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeMessage {
    pub message_type: ControlMessageType,
    /// Total mapped size of the shared region in bytes
    pub ring_buffer_size: u64,
    pub socket_path: String,
}

impl HandshakeMessage {
    pub const SIZE: usize = 1 + 8 + SOCKET_PATH_LEN;

    pub fn handshake(ring_buffer_size: u64, socket_path: impl Into<String>) -> Self {
        Self {
            message_type: ControlMessageType::Handshake,
            ring_buffer_size,
            socket_path: socket_path.into(),
        }
    }

    /// Serialize to the fixed 117-byte wire form
    ///
    /// The path must leave room for at least one terminating NUL.
    pub fn encode(&self) -> Result<[u8; Self::SIZE], LayoutError> {
        let path = self.socket_path.as_bytes();
        if path.len() >= SOCKET_PATH_LEN {
            return Err(LayoutError::SocketPathTooLong {
                len: path.len(),
                max: SOCKET_PATH_LEN - 1,
            });
        }

        let mut buf = [0u8; Self::SIZE];
        self.write_fields(&mut buf, path)
            .map_err(|_| LayoutError::BufferTooSmall {
                need: Self::SIZE,
                got: buf.len(),
                context: "handshake message",
            })?;
        Ok(buf)
    }

    fn write_fields(&self, buf: &mut [u8], path: &[u8]) -> std::io::Result<()> {
        let mut cursor = Cursor::new(buf);
        cursor.write_u8(self.message_type.into())?;
        cursor.write_u64::<LittleEndian>(self.ring_buffer_size)?;
        cursor.write_all(path)
    }

    /// Parse the wire form
    pub fn decode(bytes: &[u8]) -> Result<Self, LayoutError> {
        if bytes.len() < Self::SIZE {
            return Err(LayoutError::BufferTooSmall {
                need: Self::SIZE,
                got: bytes.len(),
                context: "handshake message",
            });
        }

        let mut cursor = Cursor::new(bytes);
        let too_small = |_| LayoutError::BufferTooSmall {
            need: Self::SIZE,
            got: bytes.len(),
            context: "handshake message",
        };

        let raw_type = cursor.read_u8().map_err(too_small)?;
        let message_type = ControlMessageType::try_from(raw_type)
            .map_err(|e| LayoutError::UnknownControlType(e.number))?;
        let ring_buffer_size = cursor.read_u64::<LittleEndian>().map_err(too_small)?;

        let mut path = [0u8; SOCKET_PATH_LEN];
        cursor.read_exact(&mut path).map_err(too_small)?;
        let end = path.iter().position(|&b| b == 0).unwrap_or(SOCKET_PATH_LEN);
        let socket_path = std::str::from_utf8(&path[..end])
            .map_err(|_| LayoutError::InvalidSocketPath)?
            .to_string();

        Ok(Self {
            message_type,
            ring_buffer_size,
            socket_path,
        })
    }
}
