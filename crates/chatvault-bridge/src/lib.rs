//! # chatvault-bridge
//!
//! Application shell of the archive: the upstream event types, their
//! ingestion into the encrypted store, the configuration value and the
//! [`Bridge`] handle that opens everything once at startup.

pub mod bridge;
pub mod config;
pub mod events;
pub mod ingest;

mod error;

pub use bridge::Bridge;
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use events::InboundEvent;
pub use ingest::{Ingestor, SyncStats};
