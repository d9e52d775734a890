use provider_backend::ApiError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("Job {0} not found")]
    NotFound(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl JobError {
    /// Text suitable for showing next to the job.
    pub fn message(&self) -> String {
        match self {
            JobError::Api(e) => e.message().to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, JobError>;
