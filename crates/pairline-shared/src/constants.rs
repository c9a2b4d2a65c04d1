/// Application name
pub const APP_NAME: &str = "Pairline";

/// Display name used when a participant joins without one
pub const DEFAULT_DISPLAY_NAME: &str = "Anonymous";

/// Maximum display name length in characters
pub const MAX_DISPLAY_NAME_CHARS: usize = 32;

/// Maximum chat message size in bytes (4 KiB)
pub const MAX_MESSAGE_SIZE: usize = 4096;

/// Session id alphabet and length (36^16 possible ids)
pub const SESSION_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const SESSION_ID_LEN: usize = 16;

/// Attempts at drawing an unused session id before giving up
pub const DEFAULT_SESSION_ID_ATTEMPTS: u32 = 4;

/// Pairing sweep interval in milliseconds
pub const DEFAULT_PAIRING_INTERVAL_MS: u64 = 1000;

/// Liveness sweep interval in milliseconds
pub const DEFAULT_LIVENESS_SWEEP_INTERVAL_MS: u64 = 2000;

/// Silence after which a participant is presumed gone, in seconds
pub const DEFAULT_LIVENESS_THRESHOLD_SECS: u64 = 10;

/// Silence after which a participant is reported as away, in seconds
pub const DEFAULT_AWAY_AFTER_SECS: u64 = 5;

/// How long closed sessions stay queryable, in seconds
pub const DEFAULT_CLOSED_RETENTION_SECS: u64 = 60;

/// Per-participant notification buffer
pub const DEFAULT_NOTIFY_CHANNEL_CAPACITY: usize = 64;

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;
