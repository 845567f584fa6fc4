use rusqlite::params;

use crate::database::{Database, WriteBatch};
use crate::error::Result;
use crate::models::{decode_ts, encode_ts, Reaction};

impl Database {
    /// Insert or overwrite the reaction keyed by its `id`.
    ///
    /// The target message does not have to be archived.
    pub fn upsert_reaction(&self, reaction: &Reaction) -> Result<()> {
        self.write_batch(|batch| batch.upsert_reaction(reaction))
    }

    /// All reactions to one message, oldest first.
    pub fn get_reactions_for_message(
        &self,
        message_id: &str,
        chat_jid: &str,
    ) -> Result<Vec<Reaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, message_id, chat_jid, reactor, emoji, timestamp, is_from_me
             FROM reactions
             WHERE message_id = ?1 AND chat_jid = ?2
             ORDER BY timestamp ASC",
        )?;

        let rows = stmt.query_map(params![message_id, chat_jid], row_to_reaction)?;

        let mut reactions = Vec::new();
        for row in rows {
            reactions.push(row?);
        }
        Ok(reactions)
    }

    /// Most recent reactions in a chat, newest first.
    pub fn get_reactions_in_chat(&self, chat_jid: &str, limit: u32) -> Result<Vec<Reaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, message_id, chat_jid, reactor, emoji, timestamp, is_from_me
             FROM reactions
             WHERE chat_jid = ?1
             ORDER BY timestamp DESC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![chat_jid, limit], row_to_reaction)?;

        let mut reactions = Vec::new();
        for row in rows {
            reactions.push(row?);
        }
        Ok(reactions)
    }
}

impl WriteBatch<'_> {
    /// See [`Database::upsert_reaction`].
    pub fn upsert_reaction(&self, reaction: &Reaction) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO reactions
                (id, message_id, chat_jid, reactor, emoji, timestamp, is_from_me)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                reaction.id,
                reaction.message_id,
                reaction.chat_jid,
                reaction.reactor,
                reaction.emoji,
                encode_ts(&reaction.timestamp)?,
                reaction.is_from_me,
            ],
        )?;
        Ok(())
    }
}

fn row_to_reaction(row: &rusqlite::Row<'_>) -> rusqlite::Result<Reaction> {
    Ok(Reaction {
        id: row.get(0)?,
        message_id: row.get(1)?,
        chat_jid: row.get(2)?,
        reactor: row.get(3)?,
        emoji: row.get(4)?,
        timestamp: decode_ts(row.get(5)?),
        is_from_me: row.get(6)?,
    })
}
