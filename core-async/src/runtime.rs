//! Runtime utilities wrapping Tokio's runtime builder so downstream crates
//! never construct executors themselves.

pub use tokio::runtime::{Builder, Handle, Runtime};

/// Runs the provided future to completion on a fresh current-thread runtime.
pub fn block_on<F>(future: F) -> F::Output
where
    F: std::future::Future,
{
    match Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime.block_on(future),
        Err(err) => panic!("core_async::runtime::block_on: failed to build Tokio runtime: {err}"),
    }
}

/// Like [`block_on`], but the runtime clock starts paused.
///
/// Timers auto-advance whenever every task is idle, so sleeps of minutes
/// complete instantly while preserving their relative ordering.
#[cfg(feature = "test-util")]
pub fn block_on_paused<F>(future: F) -> F::Output
where
    F: std::future::Future,
{
    match Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
    {
        Ok(runtime) => runtime.block_on(future),
        Err(err) => {
            panic!("core_async::runtime::block_on_paused: failed to build Tokio runtime: {err}")
        }
    }
}
