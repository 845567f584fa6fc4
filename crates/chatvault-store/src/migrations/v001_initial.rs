//! v001 -- Initial schema creation.
//!
//! Creates `chats`, `messages` and `reactions`. Reactions deliberately carry
//! no foreign key to messages: they may arrive before, after, or without the
//! message they point at.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Chats
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chats (
    jid               TEXT PRIMARY KEY NOT NULL,  -- protocol chat address
    name              TEXT NOT NULL DEFAULT '',
    last_message_time INTEGER NOT NULL            -- ns since Unix epoch, UTC
);

CREATE INDEX IF NOT EXISTS idx_chats_last_message
    ON chats(last_message_time DESC);

-- ----------------------------------------------------------------
-- Messages (ids are only unique per chat)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id              TEXT NOT NULL,
    chat_jid        TEXT NOT NULL,
    sender          TEXT NOT NULL,
    content         TEXT,
    timestamp       INTEGER NOT NULL,            -- ns since Unix epoch
    is_from_me      INTEGER NOT NULL DEFAULT 0,  -- boolean 0/1
    media_type      TEXT,                        -- image / video / audio / document
    filename        TEXT,
    url             TEXT,
    media_key       BLOB,
    file_hash       BLOB,                        -- BLAKE3 of plaintext
    enc_file_hash   BLOB,                        -- BLAKE3 of ciphertext
    file_length     INTEGER,

    PRIMARY KEY (id, chat_jid)
);

CREATE INDEX IF NOT EXISTS idx_messages_chat_ts
    ON messages(chat_jid, timestamp DESC);

-- ----------------------------------------------------------------
-- Reactions (soft reference to messages)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS reactions (
    id          TEXT PRIMARY KEY NOT NULL,
    message_id  TEXT NOT NULL,
    chat_jid    TEXT NOT NULL,
    reactor     TEXT NOT NULL,
    emoji       TEXT NOT NULL,
    timestamp   INTEGER NOT NULL,
    is_from_me  INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_reactions_message
    ON reactions(message_id, chat_jid);
CREATE INDEX IF NOT EXISTS idx_reactions_chat_ts
    ON reactions(chat_jid, timestamp DESC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
