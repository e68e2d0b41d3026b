/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Database defaults
pub const DEFAULT_DATABASE_URL: &str = "sqlite://./site-favicons.db";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

// Favicon freshness defaults
pub const DEFAULT_REFRESH_INTERVAL: &str = "24h";
pub const DEFAULT_RETRY_INTERVAL: &str = "30m";
pub const DEFAULT_SCAN_INTERVAL: &str = "1h";
pub const DEFAULT_SCAN_ON_START: bool = true;

// Work queue defaults
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;
pub const DEFAULT_ENQUEUE_TIMEOUT: &str = "1s";
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 8;

// Resolver defaults
pub const DEFAULT_HTTP_TIMEOUT: &str = "5s";
pub const DEFAULT_MAX_REDIRECTS: usize = 5;
pub const DEFAULT_MAX_ICON_BYTES: usize = 128 * 1024; // 128KiB
pub const DEFAULT_MAX_HTML_BYTES: usize = 512 * 1024; // 512KiB
pub const DEFAULT_RESOLVE_CACHE_TTL: &str = "6h";

// Logging defaults
pub const DEFAULT_LOG_LEVEL: &str = "info";
