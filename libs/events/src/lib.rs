//! # Domain Events
//!
//! Fan-out of [`types::DomainEvent`]s to registered handlers.
//!
//! Alarm consumers register synchronously so the alarm path never waits on
//! a queue; persistence, audit and telemetry consumers register
//! asynchronously and run on the dispatcher's worker thread.
//!
//! ```rust
//! use events::DomainEventDispatcher;
//! use types::{EventPayload, PatientDischarged};
//!
//! let dispatcher = DomainEventDispatcher::new()?;
//! dispatcher.register_async::<PatientDischarged, _>(|e| {
//!     tracing::info!(mrn = %e.patient_mrn, "Archiving discharged patient");
//! });
//!
//! let event = PatientDischarged {
//!     patient_mrn: "MRN-1".into(),
//!     device_id: "ZM-01".into(),
//!     timestamp_ms: 0,
//! }
//! .into_event();
//! dispatcher.dispatch(&event)?;
//! dispatcher.shutdown();
//! # Ok::<(), events::DispatchError>(())
//! ```

pub mod dispatcher;
pub mod error;

pub use dispatcher::{DispatcherStats, DomainEventDispatcher};
pub use error::DispatchError;
