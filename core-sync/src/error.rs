use thiserror::Error;

/// Why a synchronization ended without a ready result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The server reported a terminal failure (push frame or 4xx poll).
    #[error("{0}")]
    Failed(String),

    /// Consecutive poll failures reached the error threshold.
    #[error("{last_error}")]
    Unreachable { failures: u32, last_error: String },

    /// The attempt ceiling passed while the entity was still non-terminal.
    #[error("timeout")]
    Timeout { attempts: u32 },

    /// Neither a push channel nor polling could be started.
    #[error("No update channel available: {0}")]
    NoChannel(String),

    #[error("Sync cancelled")]
    Cancelled,
}

impl SyncError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
