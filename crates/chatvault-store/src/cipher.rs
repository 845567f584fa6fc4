//! Page-cipher keying for every database this workspace opens.
//!
//! A connection is only handed out after the key has been applied and
//! SQLCipher has confirmed it is active. There is no plaintext fallback.

use std::path::Path;

use chatvault_shared::constants::CIPHER_PAGE_SIZE;
use chatvault_shared::DatabaseKey;
use rusqlite::{Connection, OptionalExtension};

use crate::error::{Result, StoreError};

/// Render the keying statements that must run first on a fresh connection.
///
/// Raw 256-bit keys are passed as a blob literal so SQLCipher skips its key
/// derivation; anything else is treated as a passphrase.
pub fn keying_pragmas(key: &DatabaseKey) -> String {
    let key_clause = if key.is_raw_hex() {
        format!("PRAGMA key = \"x'{}'\";", key.expose())
    } else {
        format!("PRAGMA key = '{}';", key.expose().replace('\'', "''"))
    };
    format!("{key_clause}\nPRAGMA cipher_page_size = {CIPHER_PAGE_SIZE};")
}

/// Open (or create) the file at `path` under encryption.
///
/// Fails with [`StoreError::EncryptionUnavailable`] when SQLCipher is not
/// linked, and with a SQLite error when the key does not match the file.
pub fn open_encrypted(path: &Path, key: &DatabaseKey) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;
    conn.execute_batch(&keying_pragmas(key))?;

    let version: Option<String> = conn
        .query_row("PRAGMA cipher_version", [], |row| row.get(0))
        .optional()?;
    match version.filter(|v| !v.is_empty()) {
        Some(version) => tracing::debug!(%version, path = %path.display(), "sqlcipher active"),
        None => return Err(StoreError::EncryptionUnavailable),
    }

    // The key is only checked when the first page is read.
    conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
        row.get::<_, i64>(0)
    })?;

    Ok(conn)
}
