use std::path::PathBuf;

use thiserror::Error;

/// Failures while resolving a database key at startup.
///
/// Every variant is fatal: the process must not continue without the key.
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Failed to create key directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write key file {path}: {source}")]
    WriteKey {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read key file {path}: {source}")]
    ReadKey {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Key file {path} is empty")]
    EmptyKey { path: PathBuf },
}

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: invalid ciphertext or wrong key")]
    DecryptionFailed,

    #[error("Invalid key length")]
    InvalidKeyLength,
}
