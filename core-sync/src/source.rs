//! The entity being synchronized.
//!
//! A [`SyncSource`] tells the synchronizer where to subscribe, how to poll
//! and how to read push frames for one entity (a pending file, a job).

use async_trait::async_trait;
use bridge_traits::PushFrame;

use crate::update::SyncUpdate;

/// Why a single poll failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollFailure {
    /// Counts toward the error threshold; the loop backs off and retries.
    Transient(String),
    /// Ends synchronization immediately (e.g. `analysis_failed`, `file_not_found`).
    Terminal(String),
}

impl PollFailure {
    pub fn message(&self) -> &str {
        match self {
            PollFailure::Transient(msg) | PollFailure::Terminal(msg) => msg,
        }
    }
}

#[async_trait]
pub trait SyncSource: Send + Sync {
    type Output: Send;

    /// Push topic, e.g. `pending-file/{id}`.
    fn topic(&self) -> String;

    /// One pull request.
    async fn poll(&self) -> Result<SyncUpdate<Self::Output>, PollFailure>;

    /// Decode a push frame. `None` for frames that carry no state.
    fn decode(&self, frame: &PushFrame) -> Option<SyncUpdate<Self::Output>>;
}
