//! Domain model structs persisted in the encrypted archive.
//!
//! Every struct derives `Serialize` and `Deserialize` so the query layer can
//! hand results straight to its callers.

use chatvault_shared::MediaKind;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// A conversation, individual or group, keyed by its protocol address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chat {
    /// Protocol chat address (`user@server`).
    pub jid: String,
    /// Display name; empty when none is known yet.
    pub name: String,
    /// Timestamp of the newest message seen for this chat.
    pub last_message_time: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single archived message. `(id, chat_jid)` is the identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub chat_jid: String,
    pub sender: String,
    /// Text body, if any.
    pub content: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub is_from_me: bool,
    /// Attachment metadata, if the message carries media.
    pub media: Option<MediaDescriptor>,
}

impl Message {
    /// A message with neither text nor media is never persisted.
    pub fn is_empty(&self) -> bool {
        self.content.as_deref().map_or(true, str::is_empty) && self.media.is_none()
    }
}

// ---------------------------------------------------------------------------
// Media descriptor
// ---------------------------------------------------------------------------

/// Everything needed to fetch and decrypt an attachment later, without
/// contacting the sender again.
///
/// Only `kind` and `filename` are guaranteed; the transfer fields may be
/// missing when the upstream event did not carry them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaDescriptor {
    pub kind: MediaKind,
    pub filename: String,
    /// Remote locator of the encrypted blob.
    pub url: Option<String>,
    /// Symmetric key the blob was encrypted with.
    pub media_key: Option<Vec<u8>>,
    /// BLAKE3 hash of the plaintext.
    pub file_hash: Option<Vec<u8>>,
    /// BLAKE3 hash of the ciphertext as stored remotely.
    pub enc_file_hash: Option<Vec<u8>>,
    /// Plaintext length in bytes.
    pub file_length: Option<u64>,
}

/// Borrowed view of a descriptor whose transfer fields are all present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferInfo<'a> {
    pub url: &'a str,
    pub media_key: &'a [u8],
    pub file_hash: &'a [u8],
    pub enc_file_hash: &'a [u8],
    pub file_length: u64,
}

impl MediaDescriptor {
    pub fn metadata_only(kind: MediaKind, filename: impl Into<String>) -> Self {
        Self {
            kind,
            filename: filename.into(),
            url: None,
            media_key: None,
            file_hash: None,
            enc_file_hash: None,
            file_length: None,
        }
    }

    /// `None` unless locator, key, both hashes and a non-zero length are set.
    pub fn transfer_info(&self) -> Option<TransferInfo<'_>> {
        fn non_empty(v: &Option<Vec<u8>>) -> Option<&[u8]> {
            v.as_deref().filter(|b| !b.is_empty())
        }
        Some(TransferInfo {
            url: self.url.as_deref().filter(|u| !u.is_empty())?,
            media_key: non_empty(&self.media_key)?,
            file_hash: non_empty(&self.file_hash)?,
            enc_file_hash: non_empty(&self.enc_file_hash)?,
            file_length: self.file_length.filter(|len| *len > 0)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Reaction
// ---------------------------------------------------------------------------

/// An emoji reaction. `message_id` is a soft reference: the target message
/// may not be archived (yet).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reaction {
    pub id: String,
    pub message_id: String,
    pub chat_jid: String,
    pub reactor: String,
    pub emoji: String,
    pub timestamp: DateTime<Utc>,
    pub is_from_me: bool,
}

// ---------------------------------------------------------------------------
// Timestamp encoding
// ---------------------------------------------------------------------------

/// Nanoseconds since the Unix epoch. Integer order is time order and every
/// representable instant reads back unchanged; instants outside roughly
/// 1677..2262 are refused.
pub(crate) fn encode_ts(ts: &DateTime<Utc>) -> Result<i64> {
    ts.timestamp_nanos_opt()
        .ok_or(StoreError::TimestampOutOfRange(*ts))
}

pub(crate) fn decode_ts(nanos: i64) -> DateTime<Utc> {
    Utc.timestamp_nanos(nanos)
}
