use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Content conversion failed: {0}")]
    Conversion(String),

    #[error("Remote operation failed: {0}")]
    Remote(String),

    #[error("Failed to read state for folder '{folder_id}': {reason}")]
    StateRead { folder_id: String, reason: String },

    #[error("Failed to write state for folder '{folder_id}': {reason}")]
    StateWrite { folder_id: String, reason: String },

    #[error("Invalid folder id for state storage: {0:?}")]
    InvalidFolderId(String),

    #[error("Source id {id} is recorded as both a file and a folder")]
    KindConflict { id: String },

    #[error("Invalid run mode: {0}")]
    InvalidRunMode(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Cannot order page {page_id}: {reason}")]
    Index { page_id: String, reason: String },
}

impl From<BridgeError> for SyncError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::ConversionFailed(msg) => SyncError::Conversion(msg),
            other => SyncError::Remote(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
