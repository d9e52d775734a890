//! # Upload Pipeline
//!
//! Everything between "the user picked a file" and "the server knows what
//! is in it".
//!
//! ## Overview
//!
//! - [`LocalPreAnalyzer`]: best-effort metadata from the file's first bytes
//! - [`UploadChannel`]: streamed `PUT` to a presigned URL with percent progress
//! - [`PendingFileOrchestrator`]: one [`PendingFile`] state machine per file,
//!   from presign through confirmation to the end of server analysis
//!
//! Server analysis is followed with `core_sync::MetadataSynchronizer`
//! through [`FileMetadataSource`].

pub mod channel;
pub mod error;
pub mod matroska;
pub mod metadata;
pub mod orchestrator;
pub mod pending;
pub mod probe;
pub mod source;

pub use channel::UploadChannel;
pub use error::{Result, UploadError};
pub use metadata::{AudioTrack, MediaMetadata, Provenance, SubtitleTrack};
pub use orchestrator::PendingFileOrchestrator;
pub use pending::{AnalysisStage, FileStatus, LocalFileId, PendingFile};
pub use probe::{LocalPreAnalyzer, MatroskaProbe, MediaProbe, ProbeError, ProbeOutcome, ProbeStatus};
pub use source::FileMetadataSource;
