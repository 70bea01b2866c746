/// The default interval in milliseconds before an idle or failed step is retried.
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 1_000;

/// The default target capacity of the delayed message backlog, zero is unbounded.
pub const DEFAULT_BACKLOG_CAPACITY: usize = 0;

/// The default number of parent chain blocks fetched ahead of the extraction cursor.
pub const DEFAULT_BLOCKS_TO_PREFETCH: u64 = 64;

/// The default number of consecutive failed steps before the runner reports itself stalled.
pub const DEFAULT_STALL_TOLERANCE: u64 = 10;

/// The default interval in milliseconds between two polls of the safe and finalized headers.
pub const DEFAULT_WATCHDOG_INTERVAL_MS: u64 = 12_000;

/// The capacity of the channel between the runner and a [`crate::ChannelConsumer`].
pub const MESSAGE_CHANNEL_CAPACITY: usize = 1_024;
