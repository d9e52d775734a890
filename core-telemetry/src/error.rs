use provider_backend::ApiError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TelemetryError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Monitoring request timed out after {0} ms")]
    Timeout(u64),
}

impl TelemetryError {
    /// Text suitable for a status line.
    pub fn message(&self) -> String {
        match self {
            TelemetryError::Api(e) => e.message().to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
