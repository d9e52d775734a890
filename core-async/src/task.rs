//! Task spawning.
//!
//! ```rust
//! use core_async::task;
//!
//! async fn example() {
//!     let handle = task::spawn(async { 42 });
//!     assert_eq!(handle.await.ok(), Some(42));
//! }
//! ```

pub use tokio::task::{spawn_blocking, yield_now, AbortHandle, JoinError, JoinHandle, JoinSet};

/// Spawns a new asynchronous task on the current runtime.
///
/// The returned `JoinHandle` can be awaited for the output or used to abort
/// the task.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::task::spawn(future)
}

/// Result type for task operations.
pub type Result<T> = std::result::Result<T, JoinError>;
