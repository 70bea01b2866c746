use crate::constants;
use std::time::Duration;

/// The finality a parent chain block must reach before it is extracted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReadMode {
    /// Extract blocks as soon as they are produced.
    #[default]
    Latest,
    /// Extract blocks once they are safe.
    Safe,
    /// Extract blocks once they are finalized.
    Finalized,
}

/// The validated configuration of the [`crate::MelRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MelConfig {
    /// Whether the runner is enabled.
    pub enable: bool,
    /// The delay before an idle or failed step is retried.
    pub retry_interval: Duration,
    /// The target capacity of the delayed message backlog, zero is unbounded.
    pub backlog_capacity: usize,
    /// The number of blocks fetched ahead of the extraction cursor.
    pub blocks_to_prefetch: u64,
    /// The finality required before extracting a block.
    pub read_mode: ReadMode,
    /// The number of consecutive failed steps before the runner reports itself stalled.
    pub stall_tolerance: u64,
    /// The delay between two polls of the safe and finalized headers.
    pub watchdog_interval: Duration,
}

impl Default for MelConfig {
    fn default() -> Self {
        Self {
            enable: true,
            retry_interval: Duration::from_millis(constants::DEFAULT_RETRY_INTERVAL_MS),
            backlog_capacity: constants::DEFAULT_BACKLOG_CAPACITY,
            blocks_to_prefetch: constants::DEFAULT_BLOCKS_TO_PREFETCH,
            read_mode: ReadMode::default(),
            stall_tolerance: constants::DEFAULT_STALL_TOLERANCE,
            watchdog_interval: Duration::from_millis(constants::DEFAULT_WATCHDOG_INTERVAL_MS),
        }
    }
}
