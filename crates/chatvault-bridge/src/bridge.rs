//! The [`Bridge`] handle wires keys, stores, the media pipeline and the
//! transfer queue together once at startup.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use chatvault_media::{
    FetchedMedia, HttpTransport, MediaPipeline, MediaTransport, OutboundMedia, TransferHandle,
    TransferQueue,
};
use chatvault_shared::{resolve_key, StoreLayout};
use chatvault_store::{open_session_database, Chat, Database, Message, Reaction, StoreError};
use rusqlite::Connection;
use tracing::info;

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::events::InboundEvent;
use crate::ingest::{Ingestor, SyncStats};

pub struct Bridge {
    layout: StoreLayout,
    db: Arc<Database>,
    session: Mutex<Connection>,
    ingestor: Ingestor,
    queue: TransferQueue,
}

impl Bridge {
    /// Resolve both keys, open both databases and start the transfer workers.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(config: BridgeConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config.upload_url, config.transfer_timeout)?;
        Self::open_with_transport(config, Arc::new(transport))
    }

    /// Like [`open`](Self::open) with a caller-provided transport.
    pub fn open_with_transport(
        config: BridgeConfig,
        transport: Arc<dyn MediaTransport>,
    ) -> Result<Self> {
        config.validate()?;
        let layout = config.layout();

        // Keys first: nothing is opened until both secrets are settled.
        let messages_key = resolve_key(
            "messages",
            config.messages_key.as_deref(),
            &layout.messages_key(),
        )?;
        let session_key = resolve_key(
            "session",
            config.session_key.as_deref(),
            &layout.session_key(),
        )?;

        let db = Arc::new(Database::open_at(&layout.messages_db(), &messages_key)?);
        let session = open_session_database(&layout.session_db(), &session_key)?;

        let pipeline = Arc::new(MediaPipeline::new(
            db.clone(),
            layout.clone(),
            transport,
            config.max_upload_bytes,
        ));
        let queue = TransferQueue::spawn(pipeline, config.transfer_workers, config.transfer_queue);

        info!(store = %layout.root().display(), "bridge ready");

        Ok(Self {
            ingestor: Ingestor::new(db.clone(), config.own_user),
            layout,
            db,
            session: Mutex::new(session),
            queue,
        })
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    // ------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------

    /// Store an upstream event. Never waits on media transfers.
    pub fn ingest(&self, event: &InboundEvent) -> Result<SyncStats> {
        Ok(self.ingestor.ingest(event)?)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn get_messages(&self, chat_jid: &str, limit: u32) -> Result<Vec<Message>> {
        Ok(self.db.get_messages(chat_jid, limit)?)
    }

    pub fn list_chats(&self) -> Result<Vec<Chat>> {
        Ok(self.db.list_chats()?)
    }

    pub fn get_reactions_for_message(
        &self,
        message_id: &str,
        chat_jid: &str,
    ) -> Result<Vec<Reaction>> {
        Ok(self.db.get_reactions_for_message(message_id, chat_jid)?)
    }

    pub fn get_reactions_in_chat(&self, chat_jid: &str, limit: u32) -> Result<Vec<Reaction>> {
        Ok(self.db.get_reactions_in_chat(chat_jid, limit)?)
    }

    // ------------------------------------------------------------------
    // Media
    // ------------------------------------------------------------------

    /// Queue a download of the attachment of `(message_id, chat_jid)`.
    pub async fn request_download(
        &self,
        message_id: &str,
        chat_jid: &str,
    ) -> Result<TransferHandle<FetchedMedia>> {
        Ok(self.queue.submit_fetch(message_id, chat_jid).await?)
    }

    /// Queue encryption and upload of a local file for sending.
    pub async fn request_outbound(&self, path: PathBuf) -> Result<TransferHandle<OutboundMedia>> {
        Ok(self.queue.submit_outbound(path).await?)
    }

    // ------------------------------------------------------------------
    // Session store
    // ------------------------------------------------------------------

    /// Connection to the session database used by the protocol client.
    pub fn session(&self) -> Result<MutexGuard<'_, Connection>> {
        self.session
            .lock()
            .map_err(|_| BridgeError::Store(StoreError::LockPoisoned))
    }

    /// Drain queued transfers and stop the workers.
    pub async fn shutdown(&self) {
        self.queue.shutdown().await;
        info!("bridge stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use bytes::Bytes;
    use chatvault_media::MediaError;
    use chatvault_shared::crypto::{content_hash, encrypt, generate_symmetric_key};
    use chatvault_shared::{ChatAddress, MediaKind};
    use chrono::{TimeZone, Utc};

    use crate::events::{InboundMedia, InboundMessage};

    #[derive(Default)]
    struct StaticTransport {
        blobs: std::sync::Mutex<HashMap<String, Bytes>>,
        downloads: AtomicUsize,
    }

    #[async_trait]
    impl MediaTransport for StaticTransport {
        async fn download(
            &self,
            locator: &str,
            _expected_len: u64,
        ) -> chatvault_media::Result<Bytes> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            self.blobs
                .lock()
                .unwrap()
                .get(locator)
                .cloned()
                .ok_or_else(|| MediaError::Transport("missing".into()))
        }

        async fn upload(&self, kind: MediaKind, ciphertext: Bytes) -> chatvault_media::Result<String> {
            let locator = format!("static://{kind}/{}", ciphertext.len());
            self.blobs.lock().unwrap().insert(locator.clone(), ciphertext);
            Ok(locator)
        }
    }

    fn config(dir: &tempfile::TempDir) -> BridgeConfig {
        BridgeConfig {
            store_dir: dir.path().join("store"),
            transfer_workers: 2,
            transfer_queue: 4,
            ..BridgeConfig::default()
        }
    }

    fn text_event(id: &str, chat: &str, text: &str) -> InboundEvent {
        InboundEvent::Message(InboundMessage {
            id: id.into(),
            chat: ChatAddress::new(chat),
            sender: "1555".into(),
            push_name: Some("Alice".into()),
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            is_from_me: false,
            text: Some(text.into()),
            media: None,
        })
    }

    #[tokio::test]
    async fn open_creates_keys_and_databases() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = Bridge::open(config(&dir)).unwrap();
        let layout = bridge.layout().clone();

        for path in [
            layout.messages_key(),
            layout.session_key(),
            layout.messages_db(),
            layout.session_db(),
        ] {
            assert!(path.exists(), "{} missing", path.display());
        }
        assert_ne!(
            std::fs::read(layout.messages_key()).unwrap(),
            std::fs::read(layout.session_key()).unwrap()
        );

        bridge
            .session()
            .unwrap()
            .execute_batch("CREATE TABLE IF NOT EXISTS device (jid TEXT PRIMARY KEY)")
            .unwrap();
        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn archive_survives_restart() {
        let dir = tempfile::tempdir().unwrap();

        let bridge = Bridge::open(config(&dir)).unwrap();
        bridge
            .ingest(&text_event("m1", "1555@s.whatsapp.net", "persist me"))
            .unwrap();
        bridge.shutdown().await;
        drop(bridge);

        let bridge = Bridge::open(config(&dir)).unwrap();
        let chats = bridge.list_chats().unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].name, "Alice");
        let messages = bridge.get_messages("1555@s.whatsapp.net", 10).unwrap();
        assert_eq!(messages[0].content.as_deref(), Some("persist me"));
        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn key_override_must_match_existing_archive() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(&dir);
        cfg.messages_key = Some("first passphrase".into());
        let bridge = Bridge::open(cfg.clone()).unwrap();
        bridge.shutdown().await;
        drop(bridge);

        cfg.messages_key = Some("second passphrase".into());
        assert!(matches!(Bridge::open(cfg), Err(BridgeError::Store(_))));
    }

    #[tokio::test]
    async fn unwritable_store_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let cfg = BridgeConfig {
            store_dir: blocker.join("store"),
            ..config(&dir)
        };
        assert!(matches!(Bridge::open(cfg), Err(BridgeError::Key(_))));
    }

    #[tokio::test]
    async fn download_goes_through_the_queue() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(StaticTransport::default());
        let bridge = Bridge::open_with_transport(config(&dir), transport.clone()).unwrap();

        let plaintext = b"voice".to_vec();
        let key = generate_symmetric_key();
        let sealed = encrypt(&key, &plaintext).unwrap();
        transport
            .blobs
            .lock()
            .unwrap()
            .insert("static://blob".into(), Bytes::from(sealed.clone()));

        let InboundEvent::Message(mut msg) = text_event("m1", "1555@s.whatsapp.net", "") else {
            unreachable!()
        };
        msg.media = Some(InboundMedia {
            kind: MediaKind::Document,
            filename: Some("notes.txt".into()),
            url: Some("static://blob".into()),
            media_key: Some(key.to_vec()),
            file_hash: Some(content_hash(&plaintext).to_vec()),
            enc_file_hash: Some(content_hash(&sealed).to_vec()),
            file_length: Some(plaintext.len() as u64),
        });
        bridge.ingest(&InboundEvent::Message(msg)).unwrap();
        assert_eq!(transport.downloads.load(Ordering::SeqCst), 0);

        let first = bridge
            .request_download("m1", "1555@s.whatsapp.net")
            .await
            .unwrap()
            .await
            .unwrap();
        let second = bridge
            .request_download("m1", "1555@s.whatsapp.net")
            .await
            .unwrap()
            .await
            .unwrap();
        assert_eq!(first.path, second.path);
        assert!(first
            .path
            .ends_with(std::path::Path::new("1555@s.whatsapp.net/notes.txt")));
        assert_eq!(std::fs::read(&first.path).unwrap(), plaintext);
        assert_eq!(transport.downloads.load(Ordering::SeqCst), 1);

        bridge.shutdown().await;
        assert!(matches!(
            bridge.request_download("m1", "1555@s.whatsapp.net").await,
            Err(BridgeError::Media(MediaError::QueueClosed))
        ));
    }

    #[tokio::test]
    async fn outbound_goes_through_the_queue() {
        let dir = tempfile::tempdir().unwrap();
        let bridge =
            Bridge::open_with_transport(config(&dir), Arc::new(StaticTransport::default())).unwrap();

        let file = dir.path().join("clip.mp4");
        std::fs::write(&file, b"not really a video").unwrap();

        let out = bridge.request_outbound(file).await.unwrap().await.unwrap();
        assert_eq!(out.kind, MediaKind::Video);
        assert_eq!(out.mime_type, "video/mp4");
        assert_eq!(out.upload.file_length, 18);
        bridge.shutdown().await;
    }
}
