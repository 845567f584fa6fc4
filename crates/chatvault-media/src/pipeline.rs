//! Media lifecycle: on-demand download into the local cache and outbound
//! preparation (classify, analyse, encrypt, upload).
//!
//! Inbound messages only ever persist a [`MediaDescriptor`]; bytes move when
//! [`MediaPipeline::fetch`] is called for a specific message.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use chatvault_shared::crypto::{
    content_hash, decrypt, encrypt, generate_symmetric_key, hash_matches, key_from_slice,
    sealed_len,
};
use chatvault_shared::{ChatAddress, MediaKind, StoreLayout};
use chatvault_store::{Database, MediaDescriptor, TransferInfo};
use serde::Serialize;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::audio;
use crate::cache::MediaCache;
use crate::error::{MediaError, Result};
use crate::transport::MediaTransport;

/// An attachment available in the local cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchedMedia {
    pub kind: MediaKind,
    pub filename: String,
    /// Absolute path of the decrypted file.
    pub path: PathBuf,
}

/// Fields the outbound message envelope needs after a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedMedia {
    pub url: String,
    pub media_key: Vec<u8>,
    pub file_hash: Vec<u8>,
    pub enc_file_hash: Vec<u8>,
    pub file_length: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceNote {
    pub seconds: u32,
    pub waveform: Vec<u8>,
    pub ptt: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMedia {
    pub kind: MediaKind,
    pub mime_type: &'static str,
    pub file_name: String,
    pub upload: UploadedMedia,
    /// Present for audio, which is always sent as a voice note.
    pub voice: Option<VoiceNote>,
}

/// Map a file extension to the kind and mime type used on the wire.
pub fn classify(path: &Path) -> (MediaKind, &'static str) {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "jpg" | "jpeg" => (MediaKind::Image, "image/jpeg"),
        "png" => (MediaKind::Image, "image/png"),
        "gif" => (MediaKind::Image, "image/gif"),
        "webp" => (MediaKind::Image, "image/webp"),
        "ogg" => (MediaKind::Audio, "audio/ogg; codecs=opus"),
        "mp4" => (MediaKind::Video, "video/mp4"),
        "avi" => (MediaKind::Video, "video/avi"),
        "mov" => (MediaKind::Video, "video/quicktime"),
        _ => (MediaKind::Document, "application/octet-stream"),
    }
}

type FlightKey = (String, String);

pub struct MediaPipeline {
    db: Arc<Database>,
    cache: MediaCache,
    transport: Arc<dyn MediaTransport>,
    max_upload_bytes: u64,
    in_flight: Mutex<HashMap<FlightKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl MediaPipeline {
    pub fn new(
        db: Arc<Database>,
        layout: StoreLayout,
        transport: Arc<dyn MediaTransport>,
        max_upload_bytes: u64,
    ) -> Self {
        Self {
            db,
            cache: MediaCache::new(layout),
            transport,
            max_upload_bytes,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    // ------------------------------------------------------------------
    // Download
    // ------------------------------------------------------------------

    /// Make the attachment of `(message_id, chat_jid)` available locally.
    ///
    /// A cached file is returned without touching the network. Concurrent
    /// calls for the same message wait on each other, so at most one
    /// transfer happens.
    pub async fn fetch(&self, message_id: &str, chat_jid: &str) -> Result<FetchedMedia> {
        let (id, chat) = (message_id.to_string(), chat_jid.to_string());
        let message = self
            .with_db(move |db| db.get_message(&id, &chat))
            .await?
            .ok_or(MediaError::NotFound)?;
        let media = message.media.ok_or(MediaError::NotMedia)?;

        let target = self
            .cache
            .target_path(&ChatAddress::new(chat_jid), &media.filename)?;

        let key = (message_id.to_string(), chat_jid.to_string());
        let flight = self.flight_lock(&key);
        let result = {
            let _guard = flight.lock().await;
            self.fetch_locked(message_id, &media, &target).await
        };
        self.release_flight(&key, flight);

        result.map(|path| FetchedMedia {
            kind: media.kind,
            filename: media.filename,
            path,
        })
    }

    async fn fetch_locked(
        &self,
        message_id: &str,
        media: &MediaDescriptor,
        target: &Path,
    ) -> Result<PathBuf> {
        if let Some(path) = self.cache.lookup(target).await? {
            debug!(message_id, path = %path.display(), "media cache hit");
            return Ok(path);
        }

        let info = media.transfer_info().ok_or(MediaError::IncompleteMetadata)?;

        let declared = usize::try_from(info.file_length)
            .map_err(|_| MediaError::Integrity("declared length out of range"))?;
        let ciphertext = self
            .transport
            .download(info.url, sealed_len(declared) as u64)
            .await?;
        let plaintext = open_blob(&info, &ciphertext)?;
        let path = self.cache.write_atomic(target, &plaintext).await?;

        info!(
            message_id,
            kind = %media.kind,
            bytes = plaintext.len(),
            path = %path.display(),
            "media downloaded"
        );
        Ok(path)
    }

    /// Run an archive call on the blocking pool; the connection lock and
    /// SQLite I/O never stall an async worker.
    async fn with_db<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> chatvault_store::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        Ok(tokio::task::spawn_blocking(move || f(&db)).await??)
    }

    fn flight_lock(&self, key: &FlightKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(key.clone()).or_default().clone()
    }

    fn release_flight(&self, key: &FlightKey, flight: Arc<tokio::sync::Mutex<()>>) {
        drop(flight);
        let mut map = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        // Only the map still holds it: nobody is waiting on this message.
        if map.get(key).is_some_and(|f| Arc::strong_count(f) == 1) {
            map.remove(key);
        }
    }

    // ------------------------------------------------------------------
    // Upload
    // ------------------------------------------------------------------

    /// Encrypt and upload a local file, returning the envelope fields.
    ///
    /// Audio is analysed before anything is uploaded; a file that is not a
    /// valid Ogg stream fails here instead of producing a broken voice note.
    pub async fn prepare_outbound(&self, path: &Path) -> Result<OutboundMedia> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| MediaError::InvalidPath(path.display().to_string()))?
            .to_string();
        let (kind, mime_type) = classify(path);

        let size = fs::metadata(path).await?.len();
        if size > self.max_upload_bytes {
            return Err(MediaError::FileTooLarge {
                size,
                max: self.max_upload_bytes,
            });
        }

        let data = fs::read(path).await?;

        let voice = if kind == MediaKind::Audio {
            let analysis = audio::analyze(&data).map_err(|e| {
                warn!(file = %file_name, "rejecting audio upload: {e}");
                e
            })?;
            Some(VoiceNote {
                seconds: analysis.seconds,
                waveform: analysis.waveform.to_vec(),
                ptt: true,
            })
        } else {
            None
        };

        let media_key = generate_symmetric_key();
        let ciphertext = encrypt(&media_key, &data)?;
        let enc_file_hash = content_hash(&ciphertext).to_vec();

        let url = self
            .transport
            .upload(kind, Bytes::from(ciphertext))
            .await?;

        info!(file = %file_name, %kind, bytes = data.len(), "media uploaded");

        Ok(OutboundMedia {
            kind,
            mime_type,
            file_name,
            upload: UploadedMedia {
                url,
                media_key: media_key.to_vec(),
                file_hash: content_hash(&data).to_vec(),
                enc_file_hash,
                file_length: data.len() as u64,
            },
            voice,
        })
    }
}

/// Verify a downloaded blob against its descriptor and decrypt it.
fn open_blob(info: &TransferInfo<'_>, ciphertext: &[u8]) -> Result<Vec<u8>> {
    let declared = usize::try_from(info.file_length)
        .map_err(|_| MediaError::Integrity("declared length out of range"))?;

    if ciphertext.len() != sealed_len(declared) {
        return Err(MediaError::Integrity("ciphertext length mismatch"));
    }
    if !hash_matches(info.enc_file_hash, ciphertext) {
        return Err(MediaError::Integrity("ciphertext hash mismatch"));
    }

    let key = key_from_slice(info.media_key)?;
    let plaintext = decrypt(&key, ciphertext)?;

    if plaintext.len() != declared {
        return Err(MediaError::Integrity("plaintext length mismatch"));
    }
    if !hash_matches(info.file_hash, &plaintext) {
        return Err(MediaError::Integrity("plaintext hash mismatch"));
    }
    Ok(plaintext)
}
