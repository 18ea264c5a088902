//! Core E2E testing framework

use anyhow::{Context, Result};
use settings::MonitorSettings;
use std::path::{Path, PathBuf};
use std::sync::Once;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

static TRACING: Once = Once::new();

/// Install a test subscriber once per process; `RUST_LOG` overrides the
/// default `info` filter
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Per-test scratch space and settings
pub struct TestFramework {
    dir: tempfile::TempDir,
    settings: MonitorSettings,
    test_id: Uuid,
}

impl TestFramework {
    pub fn new() -> Result<Self> {
        Self::with_settings(MonitorSettings::default())
    }

    /// Use `settings`, with the socket path moved into the test directory
    pub fn with_settings(mut settings: MonitorSettings) -> Result<Self> {
        init_tracing();

        let test_id = Uuid::new_v4();
        let dir = tempfile::Builder::new()
            .prefix("zmon-e2e-")
            .tempdir()
            .context("Failed to create test directory")?;

        settings.transport.socket_path = dir
            .path()
            .join("sensor.sock")
            .to_string_lossy()
            .into_owned();

        info!(%test_id, dir = %dir.path().display(), "Test framework ready");
        Ok(Self {
            dir,
            settings,
            test_id,
        })
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    pub fn socket_path(&self) -> PathBuf {
        PathBuf::from(&self.settings.transport.socket_path)
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn test_id(&self) -> Uuid {
        self.test_id
    }
}

/// Poll `condition` until it holds or `timeout` elapses
pub fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}
