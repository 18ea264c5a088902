//! # Shared Types
//!
//! Definitions used by every crate in the ingestion core:
//!
//! - [`Error`] / [`Result`]: structured success-or-error wrapper. The
//!   [`ErrorCode`] category drives retry classification.
//! - [`DomainEvent`]: closed set of business events raised by aggregates and
//!   fanned out by the event dispatcher.
//! - [`VitalSample`] / [`WaveformSample`]: decoded sensor values delivered by
//!   the shared-memory transport.
//!
//! ## Architecture Role
//!
//! ```text
//! types → codec → transport
//!   │                 │
//!   ├──→ resilience   │
//!   ├──→ events  ←────┘
//!   └──→ telemetry
//! ```
//!
//! This crate has no I/O and no global state.

pub mod error;
pub mod events;
pub mod monitoring;
pub mod time;

pub use error::{Error, ErrorCode, ErrorContext, Result};
pub use events::{
    AlarmAcknowledged, AlarmCleared, AlarmPriority, AlarmRaised, AlarmSilenced, AlarmSnapshot,
    DomainEvent, EventKind, EventPayload, PatientAdmitted, PatientDischarged, PatientTransferred,
    SensorLinkChanged, TelemetryQueued,
};
pub use monitoring::{VitalSample, WaveformSample};
pub use time::{now_millis, now_millis_u64};
