//! Settings loading
//!
//! Layered with the `config` crate: defaults, then an optional TOML file,
//! then environment overrides. The result is validated before it is
//! returned, so callers never see a half-valid configuration.

use crate::error::SettingsError;
use crate::sections::{
    CircuitBreakerSettings, RetrySettings, TelemetrySettings, TransportSettings,
};
use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "ZMON";

/// Complete configuration for the ingestion core
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub transport: TransportSettings,
    pub circuit_breaker: CircuitBreakerSettings,
    pub retry: RetrySettings,
    pub telemetry: TelemetrySettings,
}

impl MonitorSettings {
    /// Load from an optional TOML file and the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::build(path, None)
    }

    /// Load with an explicit environment map instead of the process
    /// environment (keys as they would appear in the environment)
    pub fn load_with_env(path: Option<&Path>, env: HashMap<String, String>) -> Result<Self> {
        Self::build(path, Some(env))
    }

    fn build(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!("Loading monitor settings from {:?}", path);
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }

        // ZMON_<SECTION>__<KEY>, e.g. ZMON_RETRY__MAX_RETRIES=5
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let mut settings: MonitorSettings = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        settings.expand_env_vars()?;
        settings.validate().context("Invalid configuration")?;

        debug!(
            socket = %settings.transport.socket_path,
            stale_threshold_ms = settings.transport.stale_threshold_ms,
            "Monitor settings loaded"
        );
        Ok(settings)
    }

    /// Expand `$VAR` / `${VAR}` references in path values
    pub fn expand_env_vars(&mut self) -> Result<()> {
        let expanded = shellexpand::env(&self.transport.socket_path)
            .context("Failed to expand socket path")?;
        self.transport.socket_path = expanded.into_owned();
        Ok(())
    }

    /// Validate every section
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.transport.validate()?;
        self.circuit_breaker.validate()?;
        self.retry.validate()?;
        self.telemetry.validate()
    }

    /// Render as TOML (used to write a sample configuration file)
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize settings")
    }
}
