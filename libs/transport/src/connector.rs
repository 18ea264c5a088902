//! Consumer handshake
//!
//! [`RegionConnector`] hides how the consumer obtains the shared region.
//! [`UnixSocketConnector`] is the POSIX implementation: connect to the
//! producer's control socket, receive one [`HandshakeMessage`] with the
//! region descriptor attached as `SCM_RIGHTS`, and map it read-only.

use crate::error::{Result, TransportError};
use crate::region::SharedRegion;
use codec::{ControlMessageType, HandshakeMessage};
use nix::sys::socket::{recvmsg, ControlMessageOwned, MsgFlags};
use settings::TransportSettings;
use std::io::{IoSliceMut, Read};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Obtains a mapped ring buffer region from a producer
pub trait RegionConnector: Send {
    fn connect(&self) -> Result<SharedRegion>;

    /// Human-readable endpoint for logs
    fn endpoint(&self) -> String;
}

/// Unix-domain socket handshake with descriptor passing
#[derive(Debug, Clone)]
pub struct UnixSocketConnector {
    path: PathBuf,
    timeout: Duration,
}

impl UnixSocketConnector {
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }

    pub fn from_settings(settings: &TransportSettings) -> Self {
        Self::new(&settings.socket_path, settings.connect_timeout())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RegionConnector for UnixSocketConnector {
    fn connect(&self) -> Result<SharedRegion> {
        if self.path.as_os_str().is_empty() {
            return Err(TransportError::configuration(
                "socket path is empty",
                Some("socket_path"),
            ));
        }

        let stream = UnixStream::connect(&self.path).map_err(|e| {
            TransportError::connect(format!("Failed to connect to {:?}", self.path), e)
        })?;
        stream
            .set_read_timeout(Some(self.timeout))
            .map_err(|e| TransportError::io("Failed to set handshake timeout", e))?;

        debug!("Connected to control socket {:?}", self.path);

        let (message, fd) = receive_handshake(&stream)?;
        let size = usize::try_from(message.ring_buffer_size).map_err(|_| {
            TransportError::configuration(
                format!("ring buffer size {} does not fit in memory", message.ring_buffer_size),
                Some("ring_buffer_size"),
            )
        })?;

        let region = SharedRegion::from_fd(fd, size)?;
        info!(
            socket = ?self.path,
            region_bytes = size,
            "Sensor handshake complete"
        );
        Ok(region)
    }

    fn endpoint(&self) -> String {
        self.path.display().to_string()
    }
}

/// Receive one handshake message and the descriptor attached to it
pub fn receive_handshake(stream: &UnixStream) -> Result<(HandshakeMessage, OwnedFd)> {
    let mut buf = [0u8; HandshakeMessage::SIZE];
    let mut cmsg_space = nix::cmsg_space!([RawFd; 1]);

    let (received, fd) = {
        let mut iov = [IoSliceMut::new(&mut buf)];
        let msg = recvmsg::<()>(
            stream.as_raw_fd(),
            &mut iov,
            Some(&mut cmsg_space),
            MsgFlags::empty(),
        )
        .map_err(|e| TransportError::handshake_with_source("recvmsg failed", e.into()))?;

        let mut fd: Option<OwnedFd> = None;
        let cmsgs = msg
            .cmsgs()
            .map_err(|e| TransportError::handshake_with_source("bad control message", e.into()))?;
        for cmsg in cmsgs {
            if let ControlMessageOwned::ScmRights(fds) = cmsg {
                for raw in fds {
                    // SAFETY: the kernel installed a fresh descriptor we now own
                    let owned = unsafe { OwnedFd::from_raw_fd(raw) };
                    if fd.is_none() {
                        fd = Some(owned);
                    } else {
                        warn!(raw, "Closing unexpected extra descriptor");
                    }
                }
            }
        }
        (msg.bytes, fd)
    };

    if received == 0 {
        return Err(TransportError::handshake("producer closed the connection"));
    }
    if received < buf.len() {
        // Stream socket: the rest of the message may arrive separately
        let mut reader = stream;
        reader
            .read_exact(&mut buf[received..])
            .map_err(|e| TransportError::handshake_with_source("truncated handshake", e))?;
    }

    let message = HandshakeMessage::decode(&buf)?;
    match message.message_type {
        ControlMessageType::Handshake => {}
        other => {
            return Err(TransportError::handshake(format!(
                "expected handshake, producer sent {:?}",
                other
            )))
        }
    }

    let fd = fd.ok_or_else(|| TransportError::handshake("no descriptor attached to handshake"))?;
    Ok((message, fd))
}
