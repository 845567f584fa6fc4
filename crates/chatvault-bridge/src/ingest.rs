//! Ingestion of upstream events into the archive.
//!
//! Ingestion is synchronous and only ever writes metadata: attachments are
//! recorded as descriptors and fetched later on request. Each live event and
//! each history conversation is written in one transaction.

use std::sync::Arc;

use chatvault_shared::ChatAddress;
use chatvault_store::{Chat, Database, MediaDescriptor, Message, Reaction, Result, WriteBatch};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::events::{
    HistoryBatch, HistoryConversation, HistoryMessage, InboundEvent, InboundMedia, InboundMessage,
    InboundReaction,
};

/// Counters describing one ingestion call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub chats: usize,
    pub messages: usize,
    pub reactions: usize,
    /// Entries with neither text nor media.
    pub skipped: usize,
}

impl SyncStats {
    fn absorb(&mut self, other: SyncStats) {
        self.chats += other.chats;
        self.messages += other.messages;
        self.reactions += other.reactions;
        self.skipped += other.skipped;
    }
}

pub struct Ingestor {
    db: Arc<Database>,
    own_user: Option<String>,
}

impl Ingestor {
    pub fn new(db: Arc<Database>, own_user: Option<String>) -> Self {
        Self { db, own_user }
    }

    pub fn ingest(&self, event: &InboundEvent) -> Result<SyncStats> {
        match event {
            InboundEvent::Message(msg) => self.ingest_message(msg),
            InboundEvent::Reaction(reaction) => self.ingest_reaction(reaction),
            InboundEvent::HistorySync(batch) => self.ingest_history(batch),
        }
    }

    fn ingest_message(&self, msg: &InboundMessage) -> Result<SyncStats> {
        let hint = peer_hint(&msg.chat, msg.push_name.as_deref(), msg.is_from_me);
        let fallback = if msg.is_from_me { msg.chat.user() } else { msg.sender.as_str() };

        let stored = self.db.write_batch(|batch| {
            let name = chat_name(batch.get_chat(msg.chat.as_str())?, &msg.chat, None, hint, fallback);
            batch.upsert_chat(msg.chat.as_str(), &name, msg.timestamp)?;

            batch.upsert_message(&Message {
                id: msg.id.clone(),
                chat_jid: msg.chat.to_string(),
                sender: msg.sender.clone(),
                content: msg.text.clone(),
                timestamp: msg.timestamp,
                is_from_me: msg.is_from_me,
                media: msg.media.as_ref().map(|m| descriptor(m, msg.timestamp)),
            })
        })?;

        let mut stats = SyncStats { chats: 1, ..SyncStats::default() };
        if stored {
            stats.messages = 1;
            debug!(chat = %msg.chat, message_id = %msg.id, "stored message");
        } else {
            stats.skipped = 1;
        }
        Ok(stats)
    }

    fn ingest_reaction(&self, reaction: &InboundReaction) -> Result<SyncStats> {
        let hint = peer_hint(&reaction.chat, reaction.push_name.as_deref(), reaction.is_from_me);
        let fallback = if reaction.is_from_me {
            reaction.chat.user()
        } else {
            reaction.reactor.as_str()
        };

        self.db.write_batch(|batch| {
            let stored = batch.get_chat(reaction.chat.as_str())?;
            let name = chat_name(stored, &reaction.chat, None, hint, fallback);
            batch.upsert_chat(reaction.chat.as_str(), &name, reaction.timestamp)?;

            batch.upsert_reaction(&Reaction {
                id: reaction.id.clone(),
                message_id: reaction.target_message_id.clone(),
                chat_jid: reaction.chat.to_string(),
                reactor: reaction.reactor.clone(),
                emoji: reaction.emoji.clone(),
                timestamp: reaction.timestamp,
                is_from_me: reaction.is_from_me,
            })
        })?;
        debug!(
            chat = %reaction.chat,
            target = %reaction.target_message_id,
            "stored reaction"
        );

        Ok(SyncStats {
            chats: 1,
            reactions: 1,
            ..SyncStats::default()
        })
    }

    fn ingest_history(&self, batch: &HistoryBatch) -> Result<SyncStats> {
        let mut stats = SyncStats::default();

        for conversation in &batch.conversations {
            stats.absorb(self.ingest_conversation(conversation)?);
        }

        info!(
            chats = stats.chats,
            messages = stats.messages,
            reactions = stats.reactions,
            skipped = stats.skipped,
            "history sync stored"
        );
        Ok(stats)
    }

    /// Store one history conversation. Nothing of it is kept if any entry
    /// fails.
    fn ingest_conversation(&self, conversation: &HistoryConversation) -> Result<SyncStats> {
        let chat = &conversation.id;

        // Conversations without messages carry no timestamp to record.
        let Some(latest) = conversation.messages.iter().map(|m| m.timestamp).max() else {
            return Ok(SyncStats::default());
        };

        self.db.write_batch(|batch| {
            let mut stats = SyncStats { chats: 1, ..SyncStats::default() };

            let stored = batch.get_chat(chat.as_str())?;
            let name = chat_name(stored, chat, Some(conversation), None, chat.user());
            batch.upsert_chat(chat.as_str(), &name, latest)?;

            for entry in &conversation.messages {
                self.ingest_history_entry(batch, chat, entry, &mut stats)?;
            }
            Ok(stats)
        })
    }

    fn ingest_history_entry(
        &self,
        batch: &WriteBatch<'_>,
        chat: &ChatAddress,
        entry: &HistoryMessage,
        stats: &mut SyncStats,
    ) -> Result<()> {
        let sender = self.history_sender(chat, entry);

        if let Some(reaction) = &entry.reaction {
            batch.upsert_reaction(&Reaction {
                id: entry.id.clone(),
                message_id: reaction.target_message_id.clone(),
                chat_jid: chat.to_string(),
                reactor: sender,
                emoji: reaction.emoji.clone(),
                timestamp: entry.timestamp,
                is_from_me: entry.is_from_me,
            })?;
            stats.reactions += 1;
            return Ok(());
        }

        let stored = batch.upsert_message(&Message {
            id: entry.id.clone(),
            chat_jid: chat.to_string(),
            sender,
            content: entry.text.clone(),
            timestamp: entry.timestamp,
            is_from_me: entry.is_from_me,
            media: entry.media.as_ref().map(|m| descriptor(m, entry.timestamp)),
        })?;
        if stored {
            stats.messages += 1;
        } else {
            stats.skipped += 1;
        }
        Ok(())
    }

    /// Participant for group history, the local account for own messages,
    /// otherwise the other side of the chat.
    fn history_sender(&self, chat: &ChatAddress, entry: &HistoryMessage) -> String {
        if let Some(participant) = entry.participant.as_deref().filter(|p| !p.is_empty()) {
            return ChatAddress::new(participant).user().to_string();
        }
        if entry.is_from_me {
            if let Some(own) = &self.own_user {
                return own.clone();
            }
        }
        chat.user().to_string()
    }
}

/// A push name describes whoever sent the event. It names the chat only
/// when that sender is the other side of an individual chat.
fn peer_hint<'a>(
    chat: &ChatAddress,
    push_name: Option<&'a str>,
    is_from_me: bool,
) -> Option<&'a str> {
    if chat.is_group() || is_from_me {
        None
    } else {
        push_name
    }
}

/// Pick the best available name for a chat.
///
/// A name already stored wins. Otherwise the conversation's display name,
/// its plain name, then the peer hint. Groups fall back to `Group <id>`,
/// individual chats to `fallback` and then the address.
fn chat_name(
    stored: Option<Chat>,
    chat: &ChatAddress,
    conversation: Option<&HistoryConversation>,
    hint: Option<&str>,
    fallback: &str,
) -> String {
    if let Some(existing) = stored.filter(|c| !c.name.is_empty()) {
        return existing.name;
    }

    let non_empty = |s: Option<&str>| s.filter(|v| !v.trim().is_empty()).map(str::to_string);

    let candidate = conversation
        .and_then(|c| non_empty(c.display_name.as_deref()).or(non_empty(c.name.as_deref())))
        .or_else(|| non_empty(hint));
    if let Some(name) = candidate {
        return name;
    }

    if chat.is_group() {
        return format!("Group {}", chat.user());
    }
    non_empty(Some(fallback)).unwrap_or_else(|| chat.user().to_string())
}

/// Descriptor stored for an inbound attachment. Attachments without a
/// declared filename are named after their kind and the message time.
fn descriptor(media: &InboundMedia, timestamp: DateTime<Utc>) -> MediaDescriptor {
    let filename = media
        .filename
        .clone()
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| media.kind.default_filename(timestamp));

    MediaDescriptor {
        kind: media.kind,
        filename,
        url: media.url.clone(),
        media_key: media.media_key.clone(),
        file_hash: media.file_hash.clone(),
        enc_file_hash: media.enc_file_hash.clone(),
        file_length: media.file_length,
    }
}
