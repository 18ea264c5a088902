//! Domain Events
//!
//! Immutable records of business-significant state changes. Aggregates
//! create them at the instant a rule fires; the event dispatcher fans them
//! out to persistence, UI and telemetry consumers.
//!
//! The set of events is closed: [`DomainEvent`] is an enum over the payload
//! structs below and [`EventKind`] is its field-less discriminant, used as
//! the dispatcher's handler key. Each payload implements [`EventPayload`] so
//! handlers can be registered against the concrete payload type.

use serde::{Deserialize, Serialize};

/// Alarm priority as assigned by the alarm rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlarmPriority {
    Low,
    Medium,
    High,
}

/// Point-in-time view of an alarm carried by alarm events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmSnapshot {
    pub alarm_id: String,
    pub alarm_type: String,
    pub priority: AlarmPriority,
    pub value: f64,
    pub threshold: f64,
    pub patient_mrn: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmRaised {
    pub alarm: AlarmSnapshot,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmAcknowledged {
    pub alarm: AlarmSnapshot,
    pub acknowledged_by: String,
    pub acknowledged_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmSilenced {
    pub alarm: AlarmSnapshot,
    pub duration_ms: i64,
    pub silenced_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmCleared {
    pub alarm: AlarmSnapshot,
    pub resolved_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientAdmitted {
    pub patient_mrn: String,
    pub patient_name: String,
    pub bed_location: String,
    pub admission_source: String,
    pub device_id: String,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientDischarged {
    pub patient_mrn: String,
    pub device_id: String,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientTransferred {
    pub patient_mrn: String,
    pub source_device: String,
    pub target_device: String,
    pub timestamp_ms: i64,
}

/// A telemetry batch was assembled and queued for transmission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryQueued {
    pub batch_id: String,
    pub device_id: String,
    pub patient_mrn: String,
    pub timestamp_ms: i64,
    pub vital_count: usize,
    pub alarm_count: usize,
}

/// The sensor link went up or down (handshake complete, connection lost,
/// producer heartbeat stale)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorLinkChanged {
    pub source: String,
    pub connected: bool,
    pub reason: String,
    pub timestamp_ms: i64,
}

/// Implemented by every event payload type
///
/// Provides the dispatcher key and the conversions between the payload and
/// the [`DomainEvent`] wrapper.
pub trait EventPayload: Clone + Send + Sync + 'static {
    const KIND: EventKind;

    /// Borrow the payload if `event` carries this type
    fn from_event(event: &DomainEvent) -> Option<&Self>;

    /// Wrap the payload
    fn into_event(self) -> DomainEvent;

    fn aggregate_id(&self) -> &str;

    fn occurred_at_ms(&self) -> i64;
}

macro_rules! domain_events {
    ($(
        $(#[$meta:meta])*
        $variant:ident { aggregate: $($agg:ident).+, occurred_at: $at:ident }
    ),+ $(,)?) => {
        /// Discriminant of [`DomainEvent`], used as handler registry key
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum EventKind {
            $($variant,)+
        }

        impl EventKind {
            /// Stable event type tag (used in logs and persisted audit rows)
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(EventKind::$variant => stringify!($variant),)+
                }
            }
        }

        impl std::fmt::Display for EventKind {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        /// A domain event
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(tag = "event_type", content = "payload")]
        pub enum DomainEvent {
            $($(#[$meta])* $variant($variant),)+
        }

        impl DomainEvent {
            pub fn kind(&self) -> EventKind {
                match self {
                    $(DomainEvent::$variant(_) => EventKind::$variant,)+
                }
            }

            /// Identifier of the aggregate that raised the event
            pub fn aggregate_id(&self) -> &str {
                match self {
                    $(DomainEvent::$variant(e) => e.aggregate_id(),)+
                }
            }

            /// Epoch milliseconds at which the event occurred
            pub fn occurred_at_ms(&self) -> i64 {
                match self {
                    $(DomainEvent::$variant(e) => e.occurred_at_ms(),)+
                }
            }
        }

        $(
            impl EventPayload for $variant {
                const KIND: EventKind = EventKind::$variant;

                fn from_event(event: &DomainEvent) -> Option<&Self> {
                    match event {
                        DomainEvent::$variant(e) => Some(e),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }

                fn into_event(self) -> DomainEvent {
                    DomainEvent::$variant(self)
                }

                fn aggregate_id(&self) -> &str {
                    &self.$($agg).+
                }

                fn occurred_at_ms(&self) -> i64 {
                    self.$at
                }
            }

            impl From<$variant> for DomainEvent {
                fn from(payload: $variant) -> Self {
                    DomainEvent::$variant(payload)
                }
            }
        )+
    };
}

domain_events! {
    /// Real-time alarm path: registered synchronously by alarm consumers
    AlarmRaised { aggregate: alarm.alarm_id, occurred_at: timestamp_ms },
    AlarmAcknowledged { aggregate: alarm.alarm_id, occurred_at: acknowledged_at_ms },
    AlarmSilenced { aggregate: alarm.alarm_id, occurred_at: silenced_at_ms },
    AlarmCleared { aggregate: alarm.alarm_id, occurred_at: resolved_at_ms },
    PatientAdmitted { aggregate: patient_mrn, occurred_at: timestamp_ms },
    PatientDischarged { aggregate: patient_mrn, occurred_at: timestamp_ms },
    PatientTransferred { aggregate: patient_mrn, occurred_at: timestamp_ms },
    TelemetryQueued { aggregate: batch_id, occurred_at: timestamp_ms },
    SensorLinkChanged { aggregate: source, occurred_at: timestamp_ms },
}

impl DomainEvent {
    /// Stable event type tag
    pub fn event_type(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Explicit deep copy, taken once per asynchronous handler
    pub fn duplicate(&self) -> Self {
        self.clone()
    }
}
