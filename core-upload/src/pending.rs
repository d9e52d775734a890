//! # Pending File State Machine
//!
//! One [`PendingFile`] per selected source file, from selection until it is
//! removed or promoted into a conversion job.
//!
//! ## State Machine
//!
//! ```text
//! Uploading{0} → Uploading{p'} → Analyzing{stage} → Analyzing{stage'} → Ready{metadata}
//!       ↓                              ↓
//!       └────────→ Error{msg} ←────────┘
//! ```
//!
//! Transitions consume the file and return the next value, so a caller
//! holding a stale copy cannot write it back without going through the
//! same validation. `Ready` and `Error` are terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{Result, UploadError};
use crate::metadata::{MediaMetadata, Provenance};

// ============================================================================
// ID Types
// ============================================================================

/// Client-side identifier assigned at selection time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalFileId(Uuid);

impl LocalFileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LocalFileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LocalFileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for LocalFileId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// Status Types
// ============================================================================

/// Server-side analysis stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AnalysisStage {
    Queued,
    Downloading,
    Probing,
    /// A stage this client does not know by name.
    Other(String),
}

impl AnalysisStage {
    pub fn from_wire(stage: &str) -> Self {
        match stage.trim().to_ascii_lowercase().as_str() {
            "queued" | "pending" => AnalysisStage::Queued,
            "downloading" => AnalysisStage::Downloading,
            "probing" | "analyzing" => AnalysisStage::Probing,
            _ => AnalysisStage::Other(stage.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            AnalysisStage::Queued => "queued",
            AnalysisStage::Downloading => "downloading",
            AnalysisStage::Probing => "probing",
            AnalysisStage::Other(stage) => stage,
        }
    }
}

impl From<String> for AnalysisStage {
    fn from(stage: String) -> Self {
        AnalysisStage::from_wire(&stage)
    }
}

impl From<AnalysisStage> for String {
    fn from(stage: AnalysisStage) -> Self {
        stage.as_str().to_string()
    }
}

impl fmt::Display for AnalysisStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FileStatus {
    Uploading {
        progress: u8,
    },
    Analyzing {
        stage: AnalysisStage,
        eta_seconds: Option<u32>,
    },
    Ready {
        metadata: MediaMetadata,
    },
    Error {
        message: String,
    },
}

impl FileStatus {
    pub fn name(&self) -> &'static str {
        match self {
            FileStatus::Uploading { .. } => "uploading",
            FileStatus::Analyzing { .. } => "analyzing",
            FileStatus::Ready { .. } => "ready",
            FileStatus::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FileStatus::Ready { .. } | FileStatus::Error { .. })
    }
}

// ============================================================================
// Pending File Entity
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingFile {
    pub local_id: LocalFileId,
    /// Backend `file_id`, known once presign succeeds.
    pub server_id: Option<String>,
    pub filename: String,
    pub size_bytes: u64,
    pub status: FileStatus,
    /// Best metadata known so far, see `provenance`.
    pub metadata: Option<MediaMetadata>,
    pub provenance: Option<Provenance>,
    pub created_at: DateTime<Utc>,
}

impl PendingFile {
    /// A freshly selected file in `Uploading{0}`.
    pub fn new(filename: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            local_id: LocalFileId::new(),
            server_id: None,
            filename: filename.into(),
            size_bytes,
            status: FileStatus::Uploading { progress: 0 },
            metadata: None,
            provenance: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Upload percent while uploading; 100 once past the upload.
    pub fn upload_progress(&self) -> u8 {
        match self.status {
            FileStatus::Uploading { progress } => progress,
            FileStatus::Error { .. } => 0,
            _ => 100,
        }
    }

    pub fn with_server_id(mut self, server_id: impl Into<String>) -> Result<Self> {
        self.require_uploading("assign_server_id")?;
        self.server_id = Some(server_id.into());
        Ok(self)
    }

    /// Record upload progress. Values at or below the current percent are
    /// ignored so the percent never goes backwards.
    pub fn record_upload_progress(mut self, percent: u8) -> Result<Self> {
        let current = self.require_uploading("uploading")?;
        let percent = percent.min(100);
        if percent > current {
            self.status = FileStatus::Uploading { progress: percent };
        }
        Ok(self)
    }

    /// Upload finished and the backend accepted the confirmation.
    pub fn start_analysis(mut self, stage: AnalysisStage) -> Result<Self> {
        self.require_uploading("analyzing")?;
        self.status = FileStatus::Analyzing {
            stage,
            eta_seconds: None,
        };
        Ok(self)
    }

    /// Apply a progress update from the synchronizer. Absent fields keep
    /// their current value.
    pub fn record_analysis_progress(
        mut self,
        stage: Option<AnalysisStage>,
        eta_seconds: Option<u32>,
    ) -> Result<Self> {
        let FileStatus::Analyzing {
            stage: current_stage,
            eta_seconds: current_eta,
        } = &mut self.status
        else {
            return Err(self.invalid("analyzing"));
        };
        if let Some(stage) = stage {
            *current_stage = stage;
        }
        if eta_seconds.is_some() {
            *current_eta = eta_seconds;
        }
        Ok(self)
    }

    /// Merge locally probed metadata. Ignored once authoritative metadata
    /// is present, and for files that already failed.
    pub fn merge_preliminary(mut self, preliminary: MediaMetadata) -> Self {
        if preliminary.is_empty()
            || self.provenance == Some(Provenance::Authoritative)
            || matches!(self.status, FileStatus::Error { .. })
        {
            return self;
        }
        self.metadata = Some(match self.metadata.take() {
            Some(existing) => existing.overlay(&preliminary),
            None => preliminary,
        });
        self.provenance = Some(Provenance::Preliminary);
        self
    }

    /// Server analysis finished. The authoritative metadata is laid over
    /// whatever the local probe found.
    pub fn ready(mut self, authoritative: MediaMetadata) -> Result<Self> {
        if !matches!(self.status, FileStatus::Analyzing { .. }) {
            return Err(self.invalid("ready"));
        }
        let merged = self.metadata.take().unwrap_or_default().overlay(&authoritative);
        self.metadata = Some(merged.clone());
        self.provenance = Some(Provenance::Authoritative);
        self.status = FileStatus::Ready { metadata: merged };
        Ok(self)
    }

    /// Fail a non-terminal file.
    pub fn fail(mut self, message: impl Into<String>) -> Result<Self> {
        if self.is_terminal() {
            return Err(self.invalid("error"));
        }
        self.status = FileStatus::Error {
            message: message.into(),
        };
        Ok(self)
    }

    fn require_uploading(&self, to: &str) -> Result<u8> {
        match self.status {
            FileStatus::Uploading { progress } => Ok(progress),
            _ => Err(self.invalid(to)),
        }
    }

    fn invalid(&self, to: &str) -> UploadError {
        UploadError::InvalidTransition {
            from: self.status.name().to_string(),
            to: to.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzing() -> PendingFile {
        PendingFile::new("movie.mkv", 500 * 1024 * 1024)
            .with_server_id("srv-1")
            .unwrap()
            .record_upload_progress(100)
            .unwrap()
            .start_analysis(AnalysisStage::Queued)
            .unwrap()
    }

    #[test]
    fn test_new_file_is_uploading_at_zero() {
        let file = PendingFile::new("movie.mkv", 10);
        assert_eq!(file.status, FileStatus::Uploading { progress: 0 });
        assert!(file.server_id.is_none());
        assert!(!file.is_terminal());
    }

    #[test]
    fn test_upload_progress_never_decreases() {
        let file = PendingFile::new("movie.mkv", 10)
            .record_upload_progress(40)
            .unwrap()
            .record_upload_progress(30)
            .unwrap()
            .record_upload_progress(40)
            .unwrap();
        assert_eq!(file.upload_progress(), 40);

        let file = file.record_upload_progress(250).unwrap();
        assert_eq!(file.upload_progress(), 100);
    }

    #[test]
    fn test_analysis_progress_keeps_absent_fields() {
        let file = analyzing()
            .record_analysis_progress(Some(AnalysisStage::Probing), Some(30))
            .unwrap()
            .record_analysis_progress(None, None)
            .unwrap();

        assert_eq!(
            file.status,
            FileStatus::Analyzing {
                stage: AnalysisStage::Probing,
                eta_seconds: Some(30)
            }
        );
    }

    #[test]
    fn test_ready_overlays_preliminary() {
        let preliminary = MediaMetadata {
            duration_secs: Some(3598.0),
            width: Some(1920),
            ..Default::default()
        };
        let authoritative = MediaMetadata {
            duration_secs: Some(3600.0),
            video_codec: Some("h264".to_string()),
            ..Default::default()
        };

        let file = analyzing()
            .merge_preliminary(preliminary)
            .ready(authoritative)
            .unwrap();

        let FileStatus::Ready { metadata } = &file.status else {
            panic!("expected ready, got {:?}", file.status);
        };
        assert_eq!(metadata.duration_secs, Some(3600.0));
        assert_eq!(metadata.video_codec.as_deref(), Some("h264"));
        assert_eq!(metadata.width, Some(1920));
        assert_eq!(file.provenance, Some(Provenance::Authoritative));
    }

    #[test]
    fn test_preliminary_ignored_after_authoritative() {
        let file = analyzing()
            .ready(MediaMetadata {
                duration_secs: Some(3600.0),
                ..Default::default()
            })
            .unwrap()
            .merge_preliminary(MediaMetadata {
                duration_secs: Some(1.0),
                ..Default::default()
            });

        assert_eq!(file.metadata.unwrap().duration_secs, Some(3600.0));
    }

    #[test]
    fn test_terminal_states_are_final() {
        let ready = analyzing().ready(MediaMetadata::empty()).unwrap();
        assert!(ready.clone().fail("late").is_err());
        assert!(ready.clone().record_upload_progress(10).is_err());
        assert!(ready
            .record_analysis_progress(Some(AnalysisStage::Probing), None)
            .is_err());

        let failed = PendingFile::new("movie.mkv", 10).fail("presign failed").unwrap();
        assert!(failed.clone().start_analysis(AnalysisStage::Queued).is_err());
        assert!(failed.clone().ready(MediaMetadata::empty()).is_err());
        assert!(matches!(
            failed.fail("again"),
            Err(UploadError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_ready_requires_analyzing() {
        let err = PendingFile::new("movie.mkv", 10)
            .ready(MediaMetadata::empty())
            .unwrap_err();
        assert_eq!(
            err,
            UploadError::InvalidTransition {
                from: "uploading".to_string(),
                to: "ready".to_string()
            }
        );
    }

    #[test]
    fn test_stage_from_wire() {
        assert_eq!(AnalysisStage::from_wire("queued"), AnalysisStage::Queued);
        assert_eq!(AnalysisStage::from_wire("Analyzing"), AnalysisStage::Probing);
        assert_eq!(
            AnalysisStage::from_wire("extracting subtitles"),
            AnalysisStage::Other("extracting subtitles".to_string())
        );
        assert_eq!(AnalysisStage::Downloading.to_string(), "downloading");
    }

    #[test]
    fn test_status_serializes_tagged() {
        let json = serde_json::to_value(FileStatus::Uploading { progress: 40 }).unwrap();
        assert_eq!(json, serde_json::json!({"state": "uploading", "progress": 40}));

        let json = serde_json::to_value(FileStatus::Analyzing {
            stage: AnalysisStage::Probing,
            eta_seconds: None,
        })
        .unwrap();
        assert_eq!(json["stage"], "probing");
    }
}
