use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    /// Transport failure: DNS, connect, TLS, reset, or request timeout.
    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether the failure happened below HTTP and may succeed on retry.
    pub fn is_transport(&self) -> bool {
        matches!(self, BridgeError::Network(_) | BridgeError::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
