//! One-shot conversion of a plaintext SQLite archive into an encrypted one.
//!
//! Offline tool: nothing else may have either file open. The plaintext
//! source is left untouched; deleting it once the copy is verified is up to
//! the operator.

use std::io::Read;
use std::path::Path;

use chatvault_shared::constants::CIPHER_PAGE_SIZE;
use chatvault_shared::DatabaseKey;
use rusqlite::{params, Connection, DatabaseName};

use crate::cipher::open_encrypted;
use crate::error::{Result, StoreError};

const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";

/// Copy every table, index and the schema version of `plain` into a new
/// SQLCipher file at `encrypted`, keyed with `key`.
pub fn migrate_plaintext(plain: &Path, encrypted: &Path, key: &DatabaseKey) -> Result<()> {
    if !is_plaintext(plain)? {
        return Err(StoreError::Migration(format!(
            "{} is not a plaintext SQLite database",
            plain.display()
        )));
    }
    if encrypted.exists() {
        return Err(StoreError::Migration(format!(
            "refusing to overwrite {}",
            encrypted.display()
        )));
    }
    if let Some(parent) = encrypted.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(
        from = %plain.display(),
        to = %encrypted.display(),
        "encrypting plaintext archive"
    );

    let key_literal = if key.is_raw_hex() {
        format!("x'{}'", key.expose())
    } else {
        key.expose().to_string()
    };

    let conn = Connection::open(plain)?;
    let target = encrypted.to_string_lossy();
    conn.execute("ATTACH DATABASE ?1 AS encrypted KEY ?2", params![target, key_literal])?;
    conn.execute_batch(&format!(
        "PRAGMA encrypted.cipher_page_size = {CIPHER_PAGE_SIZE};"
    ))?;

    conn.query_row("SELECT sqlcipher_export('encrypted')", [], |_| Ok(()))?;

    let version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    conn.pragma_update(Some(DatabaseName::Attached("encrypted")), "user_version", version)?;
    conn.execute_batch("DETACH DATABASE encrypted;")?;
    drop(conn);

    // Prove the copy opens under the key before reporting success.
    open_encrypted(encrypted, key)?;
    if is_plaintext(encrypted)? {
        return Err(StoreError::EncryptionUnavailable);
    }

    tracing::info!(schema_version = version, "archive encrypted");
    Ok(())
}

fn is_plaintext(path: &Path) -> Result<bool> {
    let mut header = [0u8; 16];
    let mut file = std::fs::File::open(path)?;
    match file.read_exact(&mut header) {
        Ok(()) => Ok(&header == SQLITE_HEADER),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{migrations, Database};
    use chrono::{TimeZone, Utc};

    fn plain_archive(path: &Path) {
        let conn = Connection::open(path).unwrap();
        migrations::run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO chats (jid, name, last_message_time) VALUES (?1, ?2, ?3)",
            params!["1555@s.whatsapp.net", "Alice", 1_700_000_000_000_000_000i64],
        )
        .unwrap();
    }

    #[test]
    fn plaintext_archive_becomes_readable_under_key() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("messages.db");
        let encrypted = dir.path().join("encrypted").join("messages.db");
        plain_archive(&plain);

        let key = DatabaseKey::new("ab".repeat(32));
        migrate_plaintext(&plain, &encrypted, &key).unwrap();

        assert!(!std::fs::read(&encrypted).unwrap().starts_with(SQLITE_HEADER));
        assert!(is_plaintext(&plain).unwrap());

        let db = Database::open_at(&encrypted, &key).unwrap();
        let chat = db.get_chat("1555@s.whatsapp.net").unwrap().unwrap();
        assert_eq!(chat.name, "Alice");
        assert_eq!(
            chat.last_message_time,
            Utc.timestamp_opt(1_700_000_000, 0).unwrap()
        );

        assert!(Database::open_at(&encrypted, &DatabaseKey::new("cd".repeat(32))).is_err());
    }

    #[test]
    fn encrypted_source_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("already.db");
        let key = DatabaseKey::new("passphrase");
        Database::open_at(&source, &key).unwrap();

        let err = migrate_plaintext(&source, &dir.path().join("out.db"), &key).unwrap_err();
        assert!(matches!(err, StoreError::Migration(_)));
    }

    #[test]
    fn existing_destination_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("messages.db");
        let encrypted = dir.path().join("taken.db");
        plain_archive(&plain);
        std::fs::write(&encrypted, b"keep me").unwrap();

        let err = migrate_plaintext(&plain, &encrypted, &DatabaseKey::new("k")).unwrap_err();
        assert!(matches!(err, StoreError::Migration(_)));
        assert_eq!(std::fs::read(&encrypted).unwrap(), b"keep me");
    }
}
