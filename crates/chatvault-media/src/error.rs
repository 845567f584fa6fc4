use chatvault_shared::CryptoError;
use chatvault_store::StoreError;
use thiserror::Error;

use crate::audio::AudioError;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Message not found")]
    NotFound,

    #[error("Message carries no media")]
    NotMedia,

    #[error("Incomplete media metadata")]
    IncompleteMetadata,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Integrity check failed: {0}")]
    Integrity(&'static str),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid media path: {0}")]
    InvalidPath(String),

    #[error("File too large ({size} bytes, max {max})")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Transfer queue is closed")]
    QueueClosed,
}

impl MediaError {
    /// Network failures that are safe to retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, MediaError>;
