//! # mkv2cast Backend Provider
//!
//! Typed access to the mkv2cast REST API over an injected `HttpClient`.
//!
//! ## Overview
//!
//! This module provides:
//! - Presigned upload issue and completion
//! - Analysis metadata polling
//! - Conversion job creation, lookup, cancellation and active listing
//! - Host monitoring samples
//!
//! Failures come back as [`ApiError`], classified as transient, malformed or
//! rejected.

pub mod connector;
pub mod error;
pub mod types;

pub use connector::BackendConnector;
pub use error::{ApiError, Result};
pub use types::{
    JobOptions, JobResource, MetadataPoll, MonitoringResource, PresignResponse, WireAudioTrack,
    WireMetadata, WireSubtitleTrack,
};
