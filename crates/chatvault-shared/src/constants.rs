/// Application name
pub const APP_NAME: &str = "chatvault";

/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// Poly1305 authentication tag size in bytes
pub const TAG_SIZE: usize = 16;

/// Symmetric key size in bytes (database keys and media keys)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// Hex-encoded length of a raw database key
pub const HEX_KEY_LEN: usize = SYMMETRIC_KEY_SIZE * 2;

/// SQLCipher page size applied to every encrypted database
pub const CIPHER_PAGE_SIZE: u32 = 4096;

/// Maximum outbound attachment size in bytes (50 MiB)
pub const MAX_FILE_SIZE: usize = 50 * 1024 * 1024;

/// Timeout applied to a single media download or upload, in seconds
pub const TRANSFER_TIMEOUT_SECS: u64 = 30;

/// File names inside the store directory
pub const MESSAGES_KEY_FILE: &str = ".messages_key";
pub const SESSION_KEY_FILE: &str = ".session_key";
pub const MESSAGES_DB_FILE: &str = "messages.db";
pub const SESSION_DB_FILE: &str = "session.db";

/// Environment overrides for the two database keys
pub const ENV_MESSAGES_KEY: &str = "CHATVAULT_MESSAGES_KEY";
pub const ENV_SESSION_KEY: &str = "CHATVAULT_SESSION_KEY";

/// Chat address server suffix used by group conversations
pub const GROUP_SERVER: &str = "g.us";
