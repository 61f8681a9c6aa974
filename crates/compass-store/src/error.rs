use thiserror::Error;

/// Errors that can occur during persistence operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The planning session being mutated does not exist.
    #[error("planning session not found: {id}")]
    SessionNotFound { id: String },

    /// The persisted polling offset is not a valid non-negative integer.
    #[error("invalid runtime offset {value:?}")]
    InvalidOffset { value: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;
