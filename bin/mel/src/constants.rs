/// The default database url.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://mel.db?mode=rwc";

/// The default number of parent chain blocks kept in the header and log caches.
pub const DEFAULT_BLOCK_CACHE_SIZE: usize = 256;

/// The default log filter.
pub const DEFAULT_LOG_FILTER: &str = "info";
