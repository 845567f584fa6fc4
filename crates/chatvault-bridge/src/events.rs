//! Event shapes delivered by the protocol client.
//!
//! Each upstream record maps onto one explicit type here; the ingestion code
//! never inspects loosely typed payloads. Binary fields travel as hex strings
//! in the JSON form.

use chatvault_shared::{ChatAddress, MediaKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    Message(InboundMessage),
    Reaction(InboundReaction),
    HistorySync(HistoryBatch),
}

impl InboundEvent {
    /// Parse one JSON-encoded event.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

/// A live message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub chat: ChatAddress,
    /// Sender user part.
    pub sender: String,
    /// Name the sender advertises for themselves, if any.
    #[serde(default)]
    pub push_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_from_me: bool,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub media: Option<InboundMedia>,
}

/// A live reaction to a message that may or may not be archived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundReaction {
    pub id: String,
    pub target_message_id: String,
    pub chat: ChatAddress,
    pub reactor: String,
    #[serde(default)]
    pub push_name: Option<String>,
    pub emoji: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_from_me: bool,
}

/// Attachment descriptor as announced by the sender. Any transfer field may
/// be missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMedia {
    pub kind: MediaKind,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, with = "hex_bytes")]
    pub media_key: Option<Vec<u8>>,
    #[serde(default, with = "hex_bytes")]
    pub file_hash: Option<Vec<u8>>,
    #[serde(default, with = "hex_bytes")]
    pub enc_file_hash: Option<Vec<u8>>,
    #[serde(default)]
    pub file_length: Option<u64>,
}

/// A bulk history delivery. Batches may arrive in any temporal order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryBatch {
    pub conversations: Vec<HistoryConversation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryConversation {
    pub id: ChatAddress,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub messages: Vec<HistoryMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub id: String,
    /// Group participant that sent the message; absent in individual chats.
    #[serde(default)]
    pub participant: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_from_me: bool,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub media: Option<InboundMedia>,
    /// Set when this history entry is a reaction rather than a message.
    #[serde(default)]
    pub reaction: Option<HistoryReaction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryReaction {
    pub target_message_id: String,
    pub emoji: String,
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => s.serialize_some(&hex::encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(d)?
            .filter(|s| !s.is_empty())
            .map(|s| hex::decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
