use rusqlite::{params, OptionalExtension};

use chatvault_shared::MediaKind;

use crate::database::{Database, WriteBatch};
use crate::error::Result;
use crate::models::{decode_ts, encode_ts, MediaDescriptor, Message};

const MESSAGE_COLUMNS: &str = "id, chat_jid, sender, content, timestamp, is_from_me,
     media_type, filename, url, media_key, file_hash, enc_file_hash, file_length";

impl Database {
    /// Insert or overwrite the message keyed by `(id, chat_jid)`.
    ///
    /// Returns `false` without touching the database when the message has
    /// neither text nor media.
    pub fn upsert_message(&self, message: &Message) -> Result<bool> {
        if message.is_empty() {
            return Ok(false);
        }
        self.write_batch(|batch| batch.upsert_message(message))
    }

    /// Most recent messages of a chat, newest first.
    pub fn get_messages(&self, chat_jid: &str, limit: u32) -> Result<Vec<Message>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages
             WHERE chat_jid = ?1
             ORDER BY timestamp DESC
             LIMIT ?2"
        ))?;

        let rows = stmt.query_map(params![chat_jid, limit], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    pub fn get_message(&self, id: &str, chat_jid: &str) -> Result<Option<Message>> {
        let message = self
            .conn()?
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1 AND chat_jid = ?2"),
                params![id, chat_jid],
                row_to_message,
            )
            .optional()?;
        Ok(message)
    }

    /// Attachment metadata of a message. `None` when the message is unknown
    /// or carries no media.
    pub fn get_media_info(&self, id: &str, chat_jid: &str) -> Result<Option<MediaDescriptor>> {
        Ok(self.get_message(id, chat_jid)?.and_then(|m| m.media))
    }

    /// Fill in the transfer fields of an already archived media message.
    /// Returns `true` if a row was updated.
    pub fn update_media_info(
        &self,
        id: &str,
        chat_jid: &str,
        media: &MediaDescriptor,
    ) -> Result<bool> {
        let affected = self.conn()?.execute(
            "UPDATE messages
             SET url = ?1, media_key = ?2, file_hash = ?3, enc_file_hash = ?4, file_length = ?5
             WHERE id = ?6 AND chat_jid = ?7 AND media_type IS NOT NULL",
            params![
                media.url,
                media.media_key,
                media.file_hash,
                media.enc_file_hash,
                media.file_length,
                id,
                chat_jid,
            ],
        )?;
        Ok(affected > 0)
    }
}

impl WriteBatch<'_> {
    /// See [`Database::upsert_message`].
    pub fn upsert_message(&self, message: &Message) -> Result<bool> {
        if message.is_empty() {
            return Ok(false);
        }

        let media = message.media.as_ref();
        self.conn.execute(
            "INSERT OR REPLACE INTO messages
                (id, chat_jid, sender, content, timestamp, is_from_me,
                 media_type, filename, url, media_key, file_hash, enc_file_hash, file_length)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                message.id,
                message.chat_jid,
                message.sender,
                message.content.as_deref().filter(|c| !c.is_empty()),
                encode_ts(&message.timestamp)?,
                message.is_from_me,
                media.map(|m| m.kind.as_str()),
                media.map(|m| m.filename.as_str()),
                media.and_then(|m| m.url.as_deref()),
                media.and_then(|m| m.media_key.as_deref()),
                media.and_then(|m| m.file_hash.as_deref()),
                media.and_then(|m| m.enc_file_hash.as_deref()),
                media.and_then(|m| m.file_length),
            ],
        )?;
        Ok(true)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let media_type: Option<String> = row.get(6)?;

    let media = match media_type {
        Some(raw) => {
            let kind: MediaKind = raw.parse().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
            })?;
            Some(MediaDescriptor {
                kind,
                filename: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
                url: row.get(8)?,
                media_key: row.get(9)?,
                file_hash: row.get(10)?,
                enc_file_hash: row.get(11)?,
                file_length: row.get(12)?,
            })
        }
        None => None,
    };

    Ok(Message {
        id: row.get(0)?,
        chat_jid: row.get(1)?,
        sender: row.get(2)?,
        content: row.get(3)?,
        timestamp: decode_ts(row.get(4)?),
        is_from_me: row.get(5)?,
        media,
    })
}
