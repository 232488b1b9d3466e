use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Content conversion failed: {0}")]
    ConversionFailed(String),

    #[error("Remote item not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether this error came from converting source content rather than
    /// from talking to a remote service.
    pub fn is_conversion(&self) -> bool {
        matches!(self, BridgeError::ConversionFailed(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
