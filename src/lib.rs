//! Workspace umbrella crate.
//!
//! Host applications depend on `mkv2cast-client` and pick bridge defaults
//! through features instead of wiring each workspace crate themselves.
//! With `desktop-shims` (the default) the service façade is re-exported
//! with reqwest/WebSocket/tokio-fs bridges available.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
