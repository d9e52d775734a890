//! # Core Runtime Module
//!
//! Runtime plumbing shared by every mkv2cast client crate:
//! - Logging and tracing setup with credential redaction
//! - `CoreConfig`: injected bridges plus upload, polling and telemetry tuning
//! - The typed event bus the host UI subscribes to
//!
//! Feature crates (`core-upload`, `core-jobs`, `core-telemetry`) depend on
//! this crate and never on each other.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
