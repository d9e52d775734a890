//! # Local Pre-Analysis
//!
//! Best-effort metadata from the client's own copy of the file, shown while
//! the upload and server analysis are still running.
//!
//! [`LocalPreAnalyzer::analyze`] always returns a [`ProbeOutcome`]. Read
//! errors, unknown formats, parse errors and the wall-clock budget all end
//! in empty metadata with a [`ProbeStatus`] saying why, so the pipeline
//! never waits on or fails because of the probe.

use async_trait::async_trait;
use bridge_traits::FileSource;
use bytes::Bytes;
use core_async::time::timeout;
use core_runtime::config::UploadConfig;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::matroska::{self, ContainerError};
use crate::metadata::MediaMetadata;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("Malformed container: {0}")]
    Malformed(String),

    #[error("Unsupported container: {0}")]
    Unsupported(String),
}

impl From<ContainerError> for ProbeError {
    fn from(err: ContainerError) -> Self {
        match err {
            ContainerError::Unsupported(reason) => ProbeError::Unsupported(reason),
            ContainerError::Malformed(reason) => ProbeError::Malformed(reason),
        }
    }
}

/// A container parser that works from the leading bytes of a file.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap magic-number check.
    fn accepts(&self, head: &[u8]) -> bool;

    async fn probe(&self, head: Bytes) -> Result<MediaMetadata, ProbeError>;
}

/// Matroska and WebM, demuxed by symphonia.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatroskaProbe;

#[async_trait]
impl MediaProbe for MatroskaProbe {
    fn name(&self) -> &'static str {
        "matroska"
    }

    fn accepts(&self, head: &[u8]) -> bool {
        head.starts_with(&matroska::EBML_MAGIC)
    }

    async fn probe(&self, head: Bytes) -> Result<MediaMetadata, ProbeError> {
        Ok(matroska::parse(&head)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeStatus {
    Complete,
    /// No probe recognised the file.
    Unsupported,
    Failed(String),
    TimedOut,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub metadata: MediaMetadata,
    pub status: ProbeStatus,
}

impl ProbeOutcome {
    fn empty(status: ProbeStatus) -> Self {
        Self {
            metadata: MediaMetadata::empty(),
            status,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == ProbeStatus::Complete
    }
}

#[derive(Clone)]
pub struct LocalPreAnalyzer {
    probes: Vec<Arc<dyn MediaProbe>>,
    budget: Duration,
    head_bytes: usize,
}

impl std::fmt::Debug for LocalPreAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.probes.iter().map(|p| p.name()).collect();
        f.debug_struct("LocalPreAnalyzer")
            .field("probes", &names)
            .field("budget", &self.budget)
            .field("head_bytes", &self.head_bytes)
            .finish()
    }
}

impl LocalPreAnalyzer {
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            probes: vec![Arc::new(MatroskaProbe)],
            budget: config.pre_analysis_timeout,
            head_bytes: config.probe_head_bytes,
        }
    }

    /// Replace the probe list.
    pub fn with_probes(mut self, probes: Vec<Arc<dyn MediaProbe>>) -> Self {
        self.probes = probes;
        self
    }

    #[instrument(skip_all, fields(file = %source.name()))]
    pub async fn analyze(&self, source: &dyn FileSource) -> ProbeOutcome {
        match timeout(self.budget, self.run(source)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    budget_ms = self.budget.as_millis() as u64,
                    "Local probe timed out"
                );
                ProbeOutcome::empty(ProbeStatus::TimedOut)
            }
        }
    }

    async fn run(&self, source: &dyn FileSource) -> ProbeOutcome {
        let head = match source.read_head(self.head_bytes).await {
            Ok(head) => head,
            Err(e) => {
                debug!(error = %e, "Could not read file head");
                return ProbeOutcome::empty(ProbeStatus::Failed(e.to_string()));
            }
        };

        let Some(probe) = self.probes.iter().find(|p| p.accepts(&head)) else {
            debug!("No local probe for this format");
            return ProbeOutcome::empty(ProbeStatus::Unsupported);
        };

        match probe.probe(head).await {
            Ok(metadata) => {
                debug!(
                    probe = probe.name(),
                    duration_secs = ?metadata.duration_secs,
                    "Local probe finished"
                );
                ProbeOutcome {
                    metadata,
                    status: ProbeStatus::Complete,
                }
            }
            Err(ProbeError::Unsupported(reason)) => {
                debug!(probe = probe.name(), %reason, "Probe declined file");
                ProbeOutcome::empty(ProbeStatus::Unsupported)
            }
            Err(e) => {
                debug!(probe = probe.name(), error = %e, "Local probe failed");
                ProbeOutcome::empty(ProbeStatus::Failed(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matroska::test_support::sample_mkv;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::{ByteStream, InMemoryFile};
    use core_async::time::sleep;

    struct SlowProbe;

    #[async_trait]
    impl MediaProbe for SlowProbe {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn accepts(&self, _head: &[u8]) -> bool {
            true
        }

        async fn probe(&self, _head: Bytes) -> Result<MediaMetadata, ProbeError> {
            sleep(Duration::from_secs(60)).await;
            Ok(MediaMetadata {
                duration_secs: Some(1.0),
                ..Default::default()
            })
        }
    }

    struct UnreadableFile;

    fn permission_denied() -> BridgeError {
        BridgeError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "permission denied",
        ))
    }

    #[async_trait]
    impl FileSource for UnreadableFile {
        fn name(&self) -> &str {
            "locked.mkv"
        }

        fn size(&self) -> u64 {
            1
        }

        async fn read_head(&self, _max_bytes: usize) -> BridgeResult<Bytes> {
            Err(permission_denied())
        }

        async fn open_stream(&self, _chunk_size: usize) -> BridgeResult<ByteStream> {
            Err(permission_denied())
        }
    }

    #[core_async::test]
    async fn test_probes_matroska_file() {
        let analyzer = LocalPreAnalyzer::new(&UploadConfig::default());
        let file = InMemoryFile::new("movie.mkv", sample_mkv());

        let outcome = analyzer.analyze(&file).await;

        assert!(outcome.is_complete());
        assert_eq!(outcome.metadata.duration_secs, Some(3600.0));
        assert_eq!(outcome.metadata.audio_tracks[0].codec.as_deref(), Some("aac"));
    }

    #[core_async::test]
    async fn test_unknown_format_is_empty() {
        let analyzer = LocalPreAnalyzer::new(&UploadConfig::default());
        let file = InMemoryFile::new("movie.avi", b"RIFF\x00\x00\x00\x00AVI ".to_vec());

        let outcome = analyzer.analyze(&file).await;

        assert_eq!(outcome.status, ProbeStatus::Unsupported);
        assert!(outcome.metadata.is_empty());
    }

    #[core_async::test]
    async fn test_corrupt_matroska_yields_empty_outcome() {
        let analyzer = LocalPreAnalyzer::new(&UploadConfig::default());
        // EBML magic followed by an invalid size byte
        let file = InMemoryFile::new("broken.mkv", vec![0x1A, 0x45, 0xDF, 0xA3, 0x00]);

        let outcome = analyzer.analyze(&file).await;

        assert!(!outcome.is_complete());
        assert!(outcome.metadata.is_empty());
    }

    #[core_async::test]
    async fn test_read_error_is_failed() {
        let analyzer = LocalPreAnalyzer::new(&UploadConfig::default());

        let outcome = analyzer.analyze(&UnreadableFile).await;

        assert!(matches!(outcome.status, ProbeStatus::Failed(ref m) if m.contains("permission")));
    }

    #[core_async::test(start_paused)]
    async fn test_slow_probe_times_out() {
        let config = UploadConfig::default().with_pre_analysis_timeout(Duration::from_secs(10));
        let analyzer = LocalPreAnalyzer::new(&config).with_probes(vec![Arc::new(SlowProbe)]);
        let file = InMemoryFile::new("movie.mkv", vec![0u8; 16]);
        let start = core_async::time::Instant::now();

        let outcome = analyzer.analyze(&file).await;

        assert_eq!(outcome.status, ProbeStatus::TimedOut);
        assert!(outcome.metadata.is_empty());
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }
}
