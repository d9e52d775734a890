//! Time-related abstractions.
//!
//! `Instant` is Tokio's runtime-aware instant: under a paused test clock it
//! advances together with `sleep`, so elapsed-time assertions stay exact.
//!
//! ```rust
//! use core_async::time::{sleep, Duration, Instant};
//!
//! async fn example() {
//!     let start = Instant::now();
//!     sleep(Duration::from_millis(5)).await;
//!     assert!(start.elapsed() >= Duration::from_millis(5));
//! }
//! ```

pub use std::time::{Duration, SystemTime, UNIX_EPOCH};
pub use tokio::time::{
    error::Elapsed, interval, sleep, sleep_until, timeout, Instant, Interval, MissedTickBehavior,
    Sleep, Timeout,
};

#[cfg(feature = "test-util")]
pub use tokio::time::{advance, pause, resume};

/// Returns the current wall-clock time as milliseconds since UNIX_EPOCH.
///
/// A clock set before the epoch yields `0`.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
