use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite / SQLCipher error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The linked SQLite library has no page-cipher support, so the file
    /// would be written in plaintext.
    #[error("SQLCipher is not available; refusing to open an unencrypted database")]
    EncryptionUnavailable,

    /// The instant cannot be stored without losing precision or order.
    #[error("Timestamp out of range: {0}")]
    TimestampOutOfRange(DateTime<Utc>),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// A writer panicked while holding the connection.
    #[error("Database lock poisoned")]
    LockPoisoned,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
