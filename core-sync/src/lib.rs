//! # Metadata Synchronization
//!
//! Keeps the client's view of a server-side entity (a pending file under
//! analysis, a conversion job) consistent while updates arrive over a push
//! channel and a poll loop at the same time.
//!
//! ## Overview
//!
//! - [`SyncSource`]: per-entity topic, poll call and frame decoder
//! - [`Reconciler`]: ticket ordering and terminal latching
//! - [`MetadataSynchronizer`]: runs push and pull together until terminal
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::MetadataSynchronizer;
//!
//! let synchronizer = MetadataSynchronizer::from_config(&config, config.polling.clone());
//! let metadata = synchronizer
//!     .run(&source, |progress| println!("{:?}", progress.stage), &cancel)
//!     .await?;
//! ```

pub mod error;
pub mod reconciler;
pub mod source;
pub mod synchronizer;
pub mod update;

pub use error::{Result, SyncError};
pub use reconciler::{Decision, Reconciler, Ticket};
pub use source::{PollFailure, SyncSource};
pub use synchronizer::MetadataSynchronizer;
pub use update::{eta_from_wire, percent_from_wire, SyncProgress, SyncUpdate};
