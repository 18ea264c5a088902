use thiserror::Error;

/// A configuration value failed validation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("transport.socket_path must not be empty")]
    EmptySocketPath,

    #[error("transport.socket_path is {len} bytes, maximum is {max}")]
    SocketPathTooLong { len: usize, max: usize },

    #[error("{field} is invalid: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl SettingsError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

impl From<SettingsError> for types::Error {
    fn from(err: SettingsError) -> Self {
        types::Error::invalid_argument(err.to_string())
    }
}
