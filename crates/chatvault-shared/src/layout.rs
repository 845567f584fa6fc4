//! On-disk layout of a store directory.
//!
//! ```text
//! <root>/
//!   .messages_key     owner-only
//!   .session_key      owner-only
//!   messages.db       chats, messages, reactions (encrypted)
//!   session.db        protocol session data (encrypted)
//!   <chat-dir>/       cached media for one chat
//! ```

use std::path::{Path, PathBuf};

use crate::constants::{MESSAGES_DB_FILE, MESSAGES_KEY_FILE, SESSION_DB_FILE, SESSION_KEY_FILE};
use crate::types::ChatAddress;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn messages_key(&self) -> PathBuf {
        self.root.join(MESSAGES_KEY_FILE)
    }

    pub fn session_key(&self) -> PathBuf {
        self.root.join(SESSION_KEY_FILE)
    }

    pub fn messages_db(&self) -> PathBuf {
        self.root.join(MESSAGES_DB_FILE)
    }

    pub fn session_db(&self) -> PathBuf {
        self.root.join(SESSION_DB_FILE)
    }

    /// Directory holding cached media for `chat`. Not validated; callers that
    /// build file paths from untrusted names must check them first.
    pub fn chat_dir(&self, chat: &ChatAddress) -> PathBuf {
        self.root.join(chat.dir_name())
    }
}
