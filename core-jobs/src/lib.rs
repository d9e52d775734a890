//! # Conversion Jobs
//!
//! Tracks server-side conversion jobs: creation from an uploaded file,
//! dual-channel progress sync, cancellation and session bootstrap.
//!
//! ## Modules
//!
//! - [`job`]: the client-side job model and its transitions
//! - [`source`]: the job as a [`core_sync::SyncSource`]
//! - [`tracker`]: the [`JobTracker`] service

pub mod error;
pub mod job;
pub mod source;
pub mod tracker;

pub use error::{JobError, Result};
pub use job::{ConversionJob, JobStatus, MAX_ACTIVE_PROGRESS, MAX_ETA_SECONDS};
pub use source::{JobOutcome, JobSource};
pub use tracker::JobTracker;
