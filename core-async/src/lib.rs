//! Async runtime facade for the mkv2cast client core.
//!
//! Every other crate in the workspace spawns tasks, sleeps, and shares state
//! through this crate instead of naming tokio directly. That keeps timer
//! behavior uniform, which matters because upload pipelines, poll loops and
//! the telemetry scheduler are all driven by `time::sleep`, and the test
//! suites drive them with a paused clock (`#[core_async::test(start_paused)]`).
//!
//! # Modules
//!
//! - `task`: task spawning and join handles
//! - `time`: sleep, timeout, runtime-aware `Instant`
//! - `sync`: locks, channels, `Notify`, `CancellationToken`
//! - `io`: async read traits used by file sources
//! - `runtime`: `block_on` helpers used by the attribute macros
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let handle = task::spawn(async {
//!         sleep(Duration::from_millis(10)).await;
//!         42
//!     });
//!     assert_eq!(handle.await.ok(), Some(42));
//! }
//! ```

pub use core_async_macros::{main, test};

pub mod io;
pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

pub use task::spawn;
pub use time::{sleep, Duration, Instant};
