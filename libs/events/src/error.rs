use thiserror::Error;
use types::EventKind;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The dispatcher was shut down; synchronous handlers still ran
    #[error("dispatcher shut down: {rejected} async handler(s) for {kind} not queued")]
    ShutDown { kind: EventKind, rejected: usize },

    #[error("failed to start event worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

impl From<DispatchError> for types::Error {
    fn from(err: DispatchError) -> Self {
        let message = err.to_string();
        match err {
            DispatchError::ShutDown { kind, rejected } => types::Error::new(types::ErrorCode::Conflict, message)
                .with_context("event_type", kind)
                .with_context("rejected", rejected),
            DispatchError::WorkerSpawn(_) => types::Error::internal(message),
        }
    }
}
