//! Database connection management.
//!
//! The [`Database`] struct owns an encrypted [`rusqlite::Connection`] and
//! guarantees that migrations are run before any other operation. The single
//! connection sits behind a mutex, so every call, read or write, waits for
//! the one before it. WAL only helps other processes reading the file.
//!
//! All calls block. Async callers run them on the blocking pool.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chatvault_shared::DatabaseKey;
use rusqlite::Connection;

use crate::cipher::open_encrypted;
use crate::error::{Result, StoreError};
use crate::migrations;

/// Encrypted message archive.
pub struct Database {
    conn: Mutex<Connection>,
}

/// Writes that commit together or not at all. See [`Database::write_batch`].
pub struct WriteBatch<'a> {
    pub(crate) conn: &'a Connection,
}

impl Database {
    /// Open (or create) the archive at `path`, keyed with `key`.
    pub fn open_at(path: &Path, key: &DatabaseKey) -> Result<Self> {
        tracing::info!(path = %path.display(), "opening message archive");

        let conn = open_encrypted(path, key)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;

        // Run schema migrations.
        migrations::run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Lock and return the underlying connection.
    ///
    /// Callers should prefer the typed helpers, but direct access is
    /// occasionally needed for transactions or ad-hoc queries.
    pub fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Run `f` inside one transaction. An error from `f` rolls back every
    /// write it made.
    pub fn write_batch<T>(&self, f: impl FnOnce(&WriteBatch<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let out = f(&WriteBatch { conn: &tx })?;
        tx.commit()?;
        Ok(out)
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        self.conn()
            .ok()
            .and_then(|conn| conn.path().map(PathBuf::from))
    }
}

/// Open the session database owned by the protocol client.
///
/// The schema belongs to the client; this only applies the same keying
/// discipline as the archive so session data is never written in plaintext.
pub fn open_session_database(path: &Path, key: &DatabaseKey) -> Result<Connection> {
    tracing::info!(path = %path.display(), "opening session database");
    let conn = open_encrypted(path, key)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(conn)
}
