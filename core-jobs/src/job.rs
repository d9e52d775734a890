//! # Conversion Job State Machine
//!
//! Client-side view of one server conversion job.
//!
//! ## State Machine
//!
//! ```text
//! Pending ─┐
//! Queued ──┼──→ (any active status) ──→ Completed
//! Analyzing┤                        ├──→ Failed
//! Processing                        └──→ Cancelled
//! ```
//!
//! Active statuses may follow each other in any order as the server reports
//! them. Terminal statuses accept nothing further.
//!
//! ## Progress
//!
//! `progress` never goes backwards while the job is active and stays at or
//! below 99 until the job completes, so a rounding `100` from the encoder
//! does not look like a finished job.

use core_sync::SyncProgress;
use provider_backend::JobResource;
use serde::{Deserialize, Serialize};

use crate::error::{JobError, Result};

/// Longest ETA shown to users.
pub const MAX_ETA_SECONDS: u32 = 86_400;

/// Highest progress an unfinished job may report.
pub const MAX_ACTIVE_PROGRESS: u8 = 99;

// ============================================================================
// Status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Queued,
    Analyzing,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Queued => "queued",
            JobStatus::Analyzing => "analyzing",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Parse a server status string. Unknown strings yield `None`.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(JobStatus::Pending),
            "queued" => Some(JobStatus::Queued),
            "analyzing" => Some(JobStatus::Analyzing),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Conversion Job
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionJob {
    /// Server job id.
    pub id: String,
    /// Server id of the uploaded file the job converts, when known.
    pub source_file_id: Option<String>,
    pub filename: Option<String>,
    pub status: JobStatus,
    /// 0..=100
    pub progress: u8,
    pub stage: Option<String>,
    pub eta_seconds: Option<u32>,
    /// Encoding speed as a multiple of realtime.
    pub speed_factor: Option<f64>,
    pub error_message: Option<String>,
}

impl ConversionJob {
    /// A job known only by id. The first sync update fills in the rest.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_file_id: None,
            filename: None,
            status: JobStatus::Pending,
            progress: 0,
            stage: None,
            eta_seconds: None,
            speed_factor: None,
            error_message: None,
        }
    }

    /// Build from a server resource. A blank or unknown status reads as `Pending`.
    pub fn from_resource(resource: JobResource, source_file_id: Option<String>) -> Self {
        let status = JobStatus::from_wire(&resource.status).unwrap_or(JobStatus::Pending);
        let progress = core_sync::percent_from_wire(resource.progress);
        Self {
            id: resource.id,
            source_file_id,
            filename: resource.original_filename,
            status,
            progress: match status {
                JobStatus::Completed => 100,
                _ => progress.min(MAX_ACTIVE_PROGRESS),
            },
            stage: resource.current_stage,
            eta_seconds: resource
                .eta_seconds
                .map(|eta| core_sync::eta_from_wire(eta, MAX_ETA_SECONDS)),
            speed_factor: None,
            error_message: resource.error_message,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Merge a non-terminal progress report.
    ///
    /// Terminal status strings inside a progress report are ignored; only
    /// [`complete`](Self::complete), [`fail`](Self::fail) and
    /// [`cancel`](Self::cancel) end a job.
    pub fn apply_progress(mut self, update: &SyncProgress) -> Result<Self> {
        if self.is_terminal() {
            return Err(self.invalid_transition("progress"));
        }

        if let Some(status) = update
            .status
            .as_deref()
            .and_then(JobStatus::from_wire)
            .filter(JobStatus::is_active)
        {
            self.status = status;
        }
        if let Some(progress) = update.progress {
            self.progress = self.progress.max(progress.min(MAX_ACTIVE_PROGRESS));
        }
        if let Some(stage) = &update.stage {
            self.stage = Some(stage.clone());
        }
        if let Some(eta) = update.eta_seconds {
            self.eta_seconds = Some(eta.min(MAX_ETA_SECONDS));
        }
        if let Some(speed) = update.speed_factor.filter(|s| s.is_finite() && *s >= 0.0) {
            self.speed_factor = Some(speed);
        }
        Ok(self)
    }

    pub fn complete(mut self) -> Result<Self> {
        self.validate_transition(JobStatus::Completed)?;
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.eta_seconds = None;
        Ok(self)
    }

    pub fn fail(mut self, message: impl Into<String>) -> Result<Self> {
        self.validate_transition(JobStatus::Failed)?;
        self.status = JobStatus::Failed;
        self.error_message = Some(message.into());
        self.eta_seconds = None;
        Ok(self)
    }

    pub fn cancel(mut self) -> Result<Self> {
        self.validate_transition(JobStatus::Cancelled)?;
        self.status = JobStatus::Cancelled;
        self.eta_seconds = None;
        Ok(self)
    }

    fn validate_transition(&self, to: JobStatus) -> Result<()> {
        if self.is_terminal() {
            return Err(self.invalid_transition(to.as_str()));
        }
        Ok(())
    }

    fn invalid_transition(&self, to: &str) -> JobError {
        JobError::InvalidStateTransition {
            from: self.status.as_str().to_string(),
            to: to.to_string(),
        }
    }
}
