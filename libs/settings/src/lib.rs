//! Monitor Settings
//!
//! Configuration for the ingestion core, organised in one section per
//! component. Every field has a default, so an empty file (or no file)
//! yields a working configuration.
//!
//! ## Sources, lowest to highest precedence
//!
//! 1. Built-in defaults ([`MonitorSettings::default`])
//! 2. Optional TOML file
//! 3. `ZMON_`-prefixed environment variables, `__` between section and key:
//!    `ZMON_TRANSPORT__SOCKET_PATH=/run/zmon/sensor.sock`
//!
//! Components receive their section by value; nothing here is global.

pub mod error;
pub mod loader;
pub mod sections;

pub use error::SettingsError;
pub use loader::{MonitorSettings, ENV_PREFIX};
pub use sections::{
    CircuitBreakerSettings, RetrySettings, TelemetrySettings, TransportSettings,
};
