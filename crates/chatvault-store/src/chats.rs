//! Upserts and queries for [`Chat`] records.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::database::{Database, WriteBatch};
use crate::error::Result;
use crate::models::{decode_ts, encode_ts, Chat};

impl Database {
    // ------------------------------------------------------------------
    // Write
    // ------------------------------------------------------------------

    /// Insert a chat or update the existing row.
    ///
    /// A non-empty `name` replaces the stored one. `last_message_time` only
    /// moves forward: history sync delivers batches out of order, and an
    /// older event must not make a chat look less recent than it is.
    pub fn upsert_chat(
        &self,
        jid: &str,
        name: &str,
        last_message_time: DateTime<Utc>,
    ) -> Result<()> {
        self.write_batch(|batch| batch.upsert_chat(jid, name, last_message_time))
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single chat by address.
    pub fn get_chat(&self, jid: &str) -> Result<Option<Chat>> {
        query_chat(&*self.conn()?, jid)
    }

    /// List all chats, most recently active first.
    pub fn list_chats(&self) -> Result<Vec<Chat>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT jid, name, last_message_time
             FROM chats
             ORDER BY last_message_time DESC, jid ASC",
        )?;

        let rows = stmt.query_map([], row_to_chat)?;

        let mut chats = Vec::new();
        for row in rows {
            chats.push(row?);
        }
        Ok(chats)
    }
}

impl WriteBatch<'_> {
    /// See [`Database::upsert_chat`].
    pub fn upsert_chat(
        &self,
        jid: &str,
        name: &str,
        last_message_time: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO chats (jid, name, last_message_time)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(jid) DO UPDATE SET
                 name = CASE WHEN excluded.name <> '' THEN excluded.name ELSE chats.name END,
                 last_message_time = MAX(chats.last_message_time, excluded.last_message_time)",
            params![jid, name, encode_ts(&last_message_time)?],
        )?;
        Ok(())
    }

    /// Read a chat as this batch currently sees it.
    pub fn get_chat(&self, jid: &str) -> Result<Option<Chat>> {
        query_chat(self.conn, jid)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn query_chat(conn: &Connection, jid: &str) -> Result<Option<Chat>> {
    let chat = conn
        .query_row(
            "SELECT jid, name, last_message_time FROM chats WHERE jid = ?1",
            params![jid],
            row_to_chat,
        )
        .optional()?;
    Ok(chat)
}

/// Map a `rusqlite::Row` to a [`Chat`].
fn row_to_chat(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chat> {
    Ok(Chat {
        jid: row.get(0)?,
        name: row.get(1)?,
        last_message_time: decode_ts(row.get(2)?),
    })
}
