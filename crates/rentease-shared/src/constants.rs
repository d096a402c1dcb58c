/// Application name
pub const APP_NAME: &str = "RentEase";

/// Hard ceiling for a single message, envelope included (16 MiB)
pub const HARD_MESSAGE_LIMIT: usize = 16 * 1024 * 1024;

/// Default maximum serialized `sendMessage` payload (15 MiB)
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 15 * 1024 * 1024;

/// Default HTTP / WebSocket port
pub const DEFAULT_HTTP_PORT: u16 = 5000;

/// Default allowed CORS origin for local development
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";

/// Display name used when a conversation counterpart no longer resolves
pub const UNKNOWN_USER_NAME: &str = "Unknown User";

/// Avatar used when a user has none (or does not resolve)
pub const DEFAULT_AVATAR: &str = "👤";

/// Header carrying the caller identity established by the auth layer
pub const USER_ID_HEADER: &str = "x-user-id";
