//! Error types for the Notion provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotionError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Notion API error (status {status_code}, {code}): {message}")]
    ApiError {
        status_code: u16,
        code: String,
        message: String,
    },

    #[error("Block not found: {block_id}")]
    BlockNotFound { block_id: String },

    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Reordering needs the session cookie for the private API
    #[error("Session token not configured, cannot reorder page {page_id}")]
    SessionTokenMissing { page_id: String },

    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, NotionError>;

impl From<NotionError> for BridgeError {
    fn from(error: NotionError) -> Self {
        match error {
            NotionError::BlockNotFound { block_id } => BridgeError::NotFound(block_id),
            NotionError::SessionTokenMissing { .. } => BridgeError::NotAvailable(error.to_string()),
            NotionError::BridgeError(e) => e,
            other => BridgeError::OperationFailed(other.to_string()),
        }
    }
}
