//! Database key lifecycle.
//!
//! Each encrypted database has one secret, resolved exactly once at startup:
//!
//! 1. a non-empty override supplied by the caller (usually from the
//!    environment) always wins;
//! 2. otherwise an existing key file is read;
//! 3. otherwise 32 random bytes are generated, hex-encoded and written to the
//!    key file with owner-only permissions.
//!
//! There is no rotation here. Re-keying a database is an offline operation.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use rand::RngCore;
use tracing::{debug, info, warn};

use crate::constants::{HEX_KEY_LEN, SYMMETRIC_KEY_SIZE};
use crate::error::KeyError;

/// Secret used to key an encrypted database.
///
/// The value is either a 64-character hex string (a raw 256-bit key) or an
/// arbitrary passphrase that the cipher will stretch itself.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseKey(String);

impl DatabaseKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// `true` when the secret is exactly 32 hex-encoded bytes.
    pub fn is_raw_hex(&self) -> bool {
        self.0.len() == HEX_KEY_LEN && self.0.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

impl fmt::Debug for DatabaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_raw_hex() { "raw" } else { "passphrase" };
        write!(f, "DatabaseKey({kind}, <redacted>)")
    }
}

/// Generate a fresh hex-encoded 256-bit key from the OS CSPRNG.
pub fn generate_key_hex() -> String {
    let mut key = [0u8; SYMMETRIC_KEY_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut key);
    hex::encode(key)
}

/// Resolve the key called `name`, backed by `key_file`.
///
/// The same name and path yield the same secret across restarts unless the
/// file is deleted.
pub fn resolve_key(
    name: &str,
    override_value: Option<&str>,
    key_file: &Path,
) -> Result<DatabaseKey, KeyError> {
    if let Some(value) = override_value.map(str::trim).filter(|v| !v.is_empty()) {
        info!(key = name, "using externally supplied key");
        return Ok(DatabaseKey::new(value));
    }

    match fs::read_to_string(key_file) {
        Ok(contents) => return read_existing(name, key_file, &contents),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(KeyError::ReadKey {
                path: key_file.to_path_buf(),
                source,
            })
        }
    }

    if let Some(dir) = key_file.parent().filter(|d| !d.as_os_str().is_empty()) {
        create_private_dir(dir).map_err(|source| KeyError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let key = generate_key_hex();
    match write_private_file(key_file, key.as_bytes()) {
        Ok(()) => {}
        // Another process won the race; use whatever it wrote.
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            let contents =
                fs::read_to_string(key_file).map_err(|source| KeyError::ReadKey {
                    path: key_file.to_path_buf(),
                    source,
                })?;
            return read_existing(name, key_file, &contents);
        }
        Err(source) => {
            return Err(KeyError::WriteKey {
                path: key_file.to_path_buf(),
                source,
            })
        }
    }

    warn!(
        key = name,
        path = %key_file.display(),
        "generated new encryption key; back up this file, the data cannot be decrypted without it"
    );
    Ok(DatabaseKey::new(key))
}

fn read_existing(name: &str, key_file: &Path, contents: &str) -> Result<DatabaseKey, KeyError> {
    let value = contents.trim();
    if value.is_empty() {
        return Err(KeyError::EmptyKey {
            path: key_file.to_path_buf(),
        });
    }
    debug!(key = name, path = %key_file.display(), "loaded key from file");
    Ok(DatabaseKey::new(value))
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

fn write_private_file(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(data)?;
    file.sync_all()
}
