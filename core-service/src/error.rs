use core_upload::LocalFileId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Upload error: {0}")]
    Upload(#[from] core_upload::UploadError),

    #[error("Job error: {0}")]
    Job(#[from] core_jobs::JobError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] core_telemetry::TelemetryError),

    #[error("Pending file {0} is not ready for conversion")]
    NotReady(LocalFileId),
}

pub type Result<T> = std::result::Result<T, CoreError>;
