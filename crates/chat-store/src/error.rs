//! Store error types.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLx error (connection, query, etc.)
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Migration error
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Record not found
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Record already exists
    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: String },

    /// Operation requires group membership the user does not have
    #[error("user {user_id} is not a member of group {group_id}")]
    NotAMember { group_id: String, user_id: String },

    /// Operation violates a logic precondition (wrong sender, missing role)
    #[error("forbidden: {reason}")]
    Forbidden { reason: String },
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
