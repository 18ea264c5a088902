//! # Sensor Transport Codec
//!
//! Byte-exact layouts shared by the sensor producer and the monitor process:
//!
//! - [`RingBufferHeader`]: 48-byte header at offset 0 of the shared region
//! - [`FrameHeader`]: 24-byte header at the start of every ring slot
//! - [`HandshakeMessage`]: 117-byte control message sent over the Unix socket
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → [codec] → transport/
//!                 ↓           ↓
//!          Layout + CRC32   mmap, sockets,
//!          validation       atomics
//! ```
//!
//! ## What This Crate Does NOT Contain
//! - Memory mapping or atomic index access (belongs in transport/)
//! - Socket I/O or descriptor passing
//!
//! All multi-byte fields are little-endian. Layouts are `#[repr(C)]` with no
//! implicit padding and are checked by size and offset tests.

pub mod checksum;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod ring;

pub use checksum::calculate_crc32;
pub use error::LayoutError;
pub use frame::{decode_frame, encode_frame, Frame, FrameHeader, FrameType};
pub use handshake::{ControlMessageType, HandshakeMessage, DEFAULT_SOCKET_PATH, SOCKET_PATH_LEN};
pub use ring::{RingBufferHeader, RING_BUFFER_MAGIC, RING_BUFFER_VERSION};
