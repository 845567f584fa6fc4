//! # chatvault-shared
//!
//! Primitives shared by every chatvault crate: the key lifecycle for the
//! encrypted databases, symmetric media crypto, the on-disk store layout and
//! the small domain types (chat addresses, media kinds) that cross crate
//! boundaries.

pub mod constants;
pub mod crypto;
pub mod error;
pub mod keys;
pub mod layout;
pub mod types;

pub use error::{CryptoError, KeyError};
pub use keys::{resolve_key, DatabaseKey};
pub use layout::StoreLayout;
pub use types::{ChatAddress, MediaKind};
