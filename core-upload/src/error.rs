use provider_backend::ApiError;
use thiserror::Error;

use crate::pending::LocalFileId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    /// Storage answered the `PUT` with a non-2xx status.
    #[error("Upload rejected by storage (status {status})")]
    Rejected { status: u16 },

    #[error("Upload transport failed: {0}")]
    Transport(String),

    #[error("Upload aborted")]
    Aborted,

    /// The selected file could not be read.
    #[error("Cannot read source file: {0}")]
    Source(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Pending file {0} not found")]
    NotFound(LocalFileId),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

pub type Result<T> = std::result::Result<T, UploadError>;
