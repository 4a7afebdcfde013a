//! Error types for chat-sync.

use thiserror::Error;

/// Errors that can occur in the live chat layer.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] chat_store::StoreError),

    /// Subscriber fell behind the channel buffer and missed events.
    #[error("subscriber lagged, skipped {skipped} events")]
    Lagged { skipped: u64 },

    /// Notification delivery failed.
    #[error("notification failed: {0}")]
    Notify(String),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
