use chatvault_media::MediaError;
use chatvault_shared::KeyError;
use chatvault_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Key error: {0}")]
    Key(#[from] KeyError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
