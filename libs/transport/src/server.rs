//! Producer handshake
//!
//! [`HandshakeServer`] listens on the control socket and answers every
//! consumer connection with one [`HandshakeMessage`] carrying the region
//! descriptor as `SCM_RIGHTS`. It never reads from consumers and never
//! waits on them after the message is sent.

use crate::error::{Result, TransportError};
use crate::writer::RegionHandle;
use codec::HandshakeMessage;
use nix::sys::socket::{sendmsg, ControlMessage, MsgFlags};
use std::io::{ErrorKind, IoSlice, Write};
use std::os::fd::AsRawFd;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(5);

pub struct HandshakeServer {
    listener: UnixListener,
    path: PathBuf,
    region: RegionHandle,
    served: Arc<AtomicU64>,
}

impl HandshakeServer {
    /// Bind the control socket, replacing a stale socket file
    pub fn bind(path: impl AsRef<Path>, region: RegionHandle) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if path.exists() {
            std::fs::remove_file(&path)
                .map_err(|e| TransportError::io("Failed to remove existing socket", e))?;
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| TransportError::io("Failed to create socket directory", e))?;
        }

        let listener = UnixListener::bind(&path)
            .map_err(|e| TransportError::io("Failed to bind Unix socket", e))?;

        info!("Sensor control socket listening on: {:?}", path);
        Ok(Self {
            listener,
            path,
            region,
            served: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of consumers that received the descriptor
    pub fn served(&self) -> u64 {
        self.served.load(Ordering::Relaxed)
    }

    /// Block until one consumer connects and send it the handshake
    pub fn serve_one(&self) -> Result<()> {
        let (stream, _) = self
            .listener
            .accept()
            .map_err(|e| TransportError::io("Failed to accept connection", e))?;
        self.send_handshake(&stream)
    }

    /// Send the handshake message and region descriptor on `stream`
    pub fn send_handshake(&self, stream: &UnixStream) -> Result<()> {
        let message =
            HandshakeMessage::handshake(self.region.size, self.path.to_string_lossy().into_owned());
        let bytes = message.encode()?;

        let fds = [self.region.file.as_raw_fd()];
        let cmsgs = [ControlMessage::ScmRights(&fds)];
        let iov = [IoSlice::new(&bytes)];

        let sent = sendmsg::<()>(stream.as_raw_fd(), &iov, &cmsgs, MsgFlags::empty(), None)
            .map_err(|e| TransportError::handshake_with_source("sendmsg failed", e.into()))?;

        if sent < bytes.len() {
            // Descriptor already travelled with the first chunk
            let mut writer = stream;
            writer
                .write_all(&bytes[sent..])
                .map_err(|e| TransportError::handshake_with_source("short handshake write", e))?;
        }

        self.served.fetch_add(1, Ordering::Relaxed);
        debug!(region_bytes = self.region.size, "Handshake sent to consumer");
        Ok(())
    }

    /// Serve consumers on a background thread until the handle is stopped
    pub fn spawn(self) -> Result<ServerHandle> {
        self.listener
            .set_nonblocking(true)
            .map_err(|e| TransportError::io("Failed to make listener non-blocking", e))?;

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let served = Arc::clone(&self.served);
        let path = self.path.clone();

        let handle = std::thread::Builder::new()
            .name("sensor-handshake".to_string())
            .spawn(move || self.accept_loop(&stop_flag))
            .map_err(|e| TransportError::io("Failed to spawn handshake thread", e))?;

        Ok(ServerHandle {
            stop,
            served,
            path,
            handle: Some(handle),
        })
    }

    fn accept_loop(self, stop: &AtomicBool) {
        while !stop.load(Ordering::Acquire) {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    let result = stream
                        .set_nonblocking(false)
                        .map_err(|e| TransportError::io("Failed to configure stream", e))
                        .and_then(|_| self.send_handshake(&stream));
                    if let Err(e) = result {
                        warn!(error = %e, "Handshake with consumer failed");
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    std::thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }
        debug!("Handshake server stopped");
    }
}

impl Drop for HandshakeServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Background handshake server; stops and removes the socket on drop
pub struct ServerHandle {
    stop: Arc<AtomicBool>,
    served: Arc<AtomicU64>,
    path: PathBuf,
    handle: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn served(&self) -> u64 {
        self.served.load(Ordering::Relaxed)
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            info!("Sensor control socket closed: {:?}", self.path);
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
