use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chatvault_shared::MediaKind;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{MediaError, Result};

/// Moves encrypted attachment blobs to and from the remote object store.
#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Fetch the ciphertext stored at `locator`. `expected_len` is the exact
    /// sealed size the descriptor declares; a body of any other size fails
    /// with [`MediaError::Integrity`] and is not buffered past that size.
    async fn download(&self, locator: &str, expected_len: u64) -> Result<Bytes>;

    /// Store `ciphertext` and return the locator it can be fetched from.
    async fn upload(&self, kind: MediaKind, ciphertext: Bytes) -> Result<String>;
}

/// Upper bound on the buffer reserved up front for a download.
const MAX_PREALLOC: usize = 1024 * 1024;

/// [`MediaTransport`] over plain HTTP: `GET <locator>` and
/// `PUT <upload_base>/<kind>/<uuid>.enc`.
pub struct HttpTransport {
    upload_base: String,
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(upload_base: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| MediaError::Transport(format!("client: {e}")))?;
        Ok(Self {
            upload_base: upload_base.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn upload_base(&self) -> &str {
        &self.upload_base
    }
}

fn transport_error(label: &str, err: reqwest::Error) -> MediaError {
    if err.is_timeout() {
        MediaError::Transport(format!("{label}: timed out"))
    } else if let Some(status) = err.status() {
        MediaError::Transport(format!("{label}: HTTP {status}"))
    } else {
        MediaError::Transport(format!("{label}: {err}"))
    }
}

#[async_trait]
impl MediaTransport for HttpTransport {
    async fn download(&self, locator: &str, expected_len: u64) -> Result<Bytes> {
        let mut resp = self
            .http
            .get(locator)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| transport_error("download", e))?;

        if resp.content_length().is_some_and(|len| len != expected_len) {
            return Err(MediaError::Integrity("ciphertext length mismatch"));
        }
        let limit = usize::try_from(expected_len)
            .map_err(|_| MediaError::Integrity("declared length out of range"))?;

        let mut body = BytesMut::with_capacity(limit.min(MAX_PREALLOC));
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| transport_error("download", e))?
        {
            if body.len() + chunk.len() > limit {
                warn!(locator, limit, "download exceeds declared length, aborting");
                return Err(MediaError::Integrity("ciphertext length mismatch"));
            }
            body.extend_from_slice(&chunk);
        }

        debug!(bytes = body.len(), "downloaded media blob");
        Ok(body.freeze())
    }

    async fn upload(&self, kind: MediaKind, ciphertext: Bytes) -> Result<String> {
        let url = format!("{}/{}/{}.enc", self.upload_base, kind, Uuid::new_v4());
        let size = ciphertext.len();

        self.http
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(ciphertext)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| transport_error("upload", e))?;

        debug!(url = %url, bytes = size, "uploaded media blob");
        Ok(url)
    }
}
