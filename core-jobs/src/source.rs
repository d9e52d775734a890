//! One conversion job as seen by the synchronizer.

use async_trait::async_trait;
use bridge_traits::PushFrame;
use core_sync::{eta_from_wire, percent_from_wire, PollFailure, SyncProgress, SyncSource, SyncUpdate};
use provider_backend::{ApiError, BackendConnector, JobResource};
use serde_json::Value;

use crate::job::MAX_ETA_SECONDS;

/// How a job ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Cancelled,
}

/// `conversion/{job_id}` topic plus `GET /api/jobs/{job_id}/`.
pub struct JobSource {
    connector: BackendConnector,
    job_id: String,
}

impl JobSource {
    pub fn new(connector: BackendConnector, job_id: impl Into<String>) -> Self {
        Self {
            connector,
            job_id: job_id.into(),
        }
    }
}

fn terminal_status(status: &str, error: Option<String>) -> Option<SyncUpdate<JobOutcome>> {
    match status {
        "completed" => Some(SyncUpdate::Ready(JobOutcome::Completed)),
        "cancelled" => Some(SyncUpdate::Ready(JobOutcome::Cancelled)),
        "failed" => Some(SyncUpdate::Failed(
            error.unwrap_or_else(|| "Conversion failed".to_string()),
        )),
        _ => None,
    }
}

fn non_blank(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn resource_update(resource: JobResource) -> SyncUpdate<JobOutcome> {
    let status = resource.status.trim().to_ascii_lowercase();
    if let Some(terminal) = terminal_status(&status, resource.error_message) {
        return terminal;
    }
    SyncUpdate::Progress(SyncProgress {
        status: Some(status).filter(|s| !s.is_empty()),
        stage: resource.current_stage,
        message: None,
        progress: Some(percent_from_wire(resource.progress)),
        eta_seconds: resource
            .eta_seconds
            .map(|eta| eta_from_wire(eta, MAX_ETA_SECONDS)),
        speed_factor: None,
    })
}

#[async_trait]
impl SyncSource for JobSource {
    type Output = JobOutcome;

    fn topic(&self) -> String {
        format!("conversion/{}", self.job_id)
    }

    async fn poll(&self) -> Result<SyncUpdate<JobOutcome>, PollFailure> {
        match self.connector.get_job(&self.job_id).await {
            Ok(resource) => Ok(resource_update(resource)),
            Err(ApiError::Rejected { message, .. }) => Err(PollFailure::Terminal(message)),
            Err(e) => Err(PollFailure::Transient(e.message().to_string())),
        }
    }

    /// `progress` and `status` frames carry job state. `cancel_response`
    /// and protocol `error` frames do not.
    fn decode(&self, frame: &PushFrame) -> Option<SyncUpdate<JobOutcome>> {
        match frame.get("type")?.as_str()? {
            "status" | "progress" => {}
            _ => return None,
        }

        let status = non_blank(&frame["status"]).map(|s| s.to_ascii_lowercase());
        if let Some(terminal) = status
            .as_deref()
            .and_then(|s| terminal_status(s, non_blank(&frame["error"])))
        {
            return Some(terminal);
        }

        Some(SyncUpdate::Progress(SyncProgress {
            status,
            stage: non_blank(&frame["stage"]),
            message: None,
            progress: frame["progress"].as_f64().map(percent_from_wire),
            eta_seconds: frame["eta"]
                .as_f64()
                .map(|eta| eta_from_wire(eta, MAX_ETA_SECONDS)),
            speed_factor: frame["speed"].as_f64(),
        }))
    }
}
