//! Bridge configuration loaded from environment variables.
//!
//! Every setting has a default, so the bridge starts with zero configuration.
//! The value is built once at startup and handed to [`crate::Bridge::open`].

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chatvault_shared::constants::{
    APP_NAME, ENV_MESSAGES_KEY, ENV_SESSION_KEY, MAX_FILE_SIZE, TRANSFER_TIMEOUT_SECS,
};
use chatvault_shared::StoreLayout;

use crate::error::BridgeError;

#[derive(Clone)]
pub struct BridgeConfig {
    /// Directory holding key files, databases and cached media.
    /// Env: `CHATVAULT_STORE_DIR`
    /// Default: the platform data directory, or `./store`.
    pub store_dir: PathBuf,

    /// Override for the message archive key.
    /// Env: `CHATVAULT_MESSAGES_KEY`
    pub messages_key: Option<String>,

    /// Override for the session database key.
    /// Env: `CHATVAULT_SESSION_KEY`
    pub session_key: Option<String>,

    /// Local account user, recorded as the sender of own history messages.
    /// Env: `CHATVAULT_OWN_USER`
    pub own_user: Option<String>,

    /// Base URL outbound attachments are uploaded under.
    /// Env: `CHATVAULT_UPLOAD_URL`
    /// Default: `http://127.0.0.1:8080/media`
    pub upload_url: String,

    /// Env: `CHATVAULT_TRANSFER_WORKERS`
    /// Default: `4`
    pub transfer_workers: usize,

    /// Maximum number of queued transfer jobs.
    /// Env: `CHATVAULT_TRANSFER_QUEUE`
    /// Default: `64`
    pub transfer_queue: usize,

    /// Timeout for a single download or upload.
    /// Env: `CHATVAULT_TRANSFER_TIMEOUT_SECS`
    /// Default: `30`
    pub transfer_timeout: Duration,

    /// Env: `CHATVAULT_MAX_UPLOAD_BYTES`
    /// Default: 50 MiB
    pub max_upload_bytes: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            messages_key: None,
            session_key: None,
            own_user: None,
            upload_url: "http://127.0.0.1:8080/media".to_string(),
            transfer_workers: 4,
            transfer_queue: 64,
            transfer_timeout: Duration::from_secs(TRANSFER_TIMEOUT_SECS),
            max_upload_bytes: MAX_FILE_SIZE as u64,
        }
    }
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("BridgeConfig")
            .field("store_dir", &self.store_dir)
            .field("messages_key", &redact(&self.messages_key))
            .field("session_key", &redact(&self.session_key))
            .field("own_user", &self.own_user)
            .field("upload_url", &self.upload_url)
            .field("transfer_workers", &self.transfer_workers)
            .field("transfer_queue", &self.transfer_queue)
            .field("transfer_timeout", &self.transfer_timeout)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish()
    }
}

impl BridgeConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(dir) = lookup("CHATVAULT_STORE_DIR").filter(|v| !v.is_empty()) {
            config.store_dir = PathBuf::from(dir);
        }

        config.messages_key = lookup(ENV_MESSAGES_KEY).filter(|v| !v.trim().is_empty());
        config.session_key = lookup(ENV_SESSION_KEY).filter(|v| !v.trim().is_empty());
        config.own_user = lookup("CHATVAULT_OWN_USER").filter(|v| !v.is_empty());

        if let Some(url) = lookup("CHATVAULT_UPLOAD_URL") {
            if is_http_url(&url) {
                config.upload_url = url;
            } else {
                tracing::warn!(value = %url, "Invalid CHATVAULT_UPLOAD_URL, using default");
            }
        }

        parse_positive(&lookup, "CHATVAULT_TRANSFER_WORKERS", &mut config.transfer_workers);
        parse_positive(&lookup, "CHATVAULT_TRANSFER_QUEUE", &mut config.transfer_queue);
        parse_positive(&lookup, "CHATVAULT_MAX_UPLOAD_BYTES", &mut config.max_upload_bytes);

        let mut timeout_secs = config.transfer_timeout.as_secs();
        parse_positive(&lookup, "CHATVAULT_TRANSFER_TIMEOUT_SECS", &mut timeout_secs);
        config.transfer_timeout = Duration::from_secs(timeout_secs);

        // RUST_LOG is read by the subscriber's EnvFilter directly.

        config
    }

    /// Reject values that cannot come out of [`from_env`](Self::from_env) but
    /// can be set by hand.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.store_dir.as_os_str().is_empty() {
            return Err(BridgeError::Config("store directory is empty".to_string()));
        }
        if !is_http_url(&self.upload_url) {
            return Err(BridgeError::Config(format!(
                "upload URL must be http(s): {}",
                self.upload_url
            )));
        }
        if self.transfer_workers == 0 || self.transfer_queue == 0 {
            return Err(BridgeError::Config(
                "transfer workers and queue depth must be positive".to_string(),
            ));
        }
        if self.transfer_timeout.is_zero() {
            return Err(BridgeError::Config("transfer timeout must be positive".to_string()));
        }
        Ok(())
    }

    pub fn layout(&self) -> StoreLayout {
        StoreLayout::new(&self.store_dir)
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn default_store_dir() -> PathBuf {
    directories::ProjectDirs::from("com", APP_NAME, APP_NAME)
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./store"))
}

/// Overwrite `target` with a positive number read from `name`, or warn and
/// keep the default.
fn parse_positive<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, target: &mut T)
where
    T: FromStr + PartialOrd + Default + fmt::Display,
{
    let Some(raw) = lookup(name) else { return };
    match raw.trim().parse::<T>() {
        Ok(v) if v > T::default() => *target = v,
        _ => tracing::warn!(value = %raw, default = %target, "Invalid {name}, using default"),
    }
}
