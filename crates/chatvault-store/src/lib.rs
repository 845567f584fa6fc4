//! # chatvault-store
//!
//! Encrypted message archive backed by SQLCipher.
//!
//! All chats, messages and reactions live in one page-encrypted SQLite file,
//! keyed with the secret resolved by [`chatvault_shared::keys`]. The crate
//! exposes a [`Database`] handle that serializes access behind a mutex and
//! provides typed upsert/query helpers for every domain model, plus
//! [`WriteBatch`] for writes that must land together.

pub mod chats;
pub mod cipher;
pub mod database;
pub mod messages;
pub mod migrate;
pub mod migrations;
pub mod models;
pub mod reactions;

mod error;

pub use cipher::{keying_pragmas, open_encrypted};
pub use database::{open_session_database, Database, WriteBatch};
pub use migrate::migrate_plaintext;
pub use error::{Result, StoreError};
pub use models::*;
