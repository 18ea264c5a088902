//! # Sensor Transport
//!
//! Zero-copy delivery of vital-sign and waveform frames from an external
//! sensor producer into the monitor process.
//!
//! ## Architecture Role
//!
//! ```text
//! producer process                         monitor process
//! ┌────────────────────┐   Unix socket    ┌───────────────────────┐
//! │ HandshakeServer    │ ───────────────→ │ UnixSocketConnector   │
//! │  (fd via SCM_RIGHTS)│                 │  → SharedRegion (ro)  │
//! │ SharedRegionWriter │   shared memory  │ RingBufferReader      │
//! │  write_frame()     │ ═══════════════→ │  try_read() / drain() │
//! │  heartbeat thread  │                  │ SharedMemorySensorSource
//! └────────────────────┘                  └───────────────────────┘
//! ```
//!
//! The producer never blocks on the consumer. A consumer that falls more
//! than `frame_count` frames behind loses the oldest frames and counts them.
//!
//! ## Failure Classes
//!
//! - connect refused / handshake I/O: transient, safe to retry
//! - bad magic, version, geometry, or mmap failure: fatal
//! - frame CRC mismatch: that frame is dropped, the session continues
//! - stale heartbeat: reported through `is_stale()`, non-fatal

pub mod connector;
pub mod error;
pub mod reader;
pub mod region;
pub mod server;
pub mod source;
pub mod writer;

pub use connector::{receive_handshake, RegionConnector, UnixSocketConnector};
pub use error::{PayloadError, Result, TransportError};
pub use reader::{ReaderStats, RingBufferReader, SensorFrame};
pub use region::SharedRegion;
pub use server::{HandshakeServer, ServerHandle};
pub use source::{decode_samples, SensorDataSource, SensorSample, SharedMemorySensorSource, SourceInfo};
pub use writer::{HeartbeatHandle, RegionHandle, SharedRegionWriter};
