use crate::{
    config::{MelConfig, ReadMode},
    constants, RunnerError,
};
use std::time::Duration;

/// The message extraction arguments.
#[derive(Debug, Clone, PartialEq, Eq, clap::Args)]
pub struct MelArgs {
    /// Enable the message extraction runner.
    #[arg(long = "mel.enable", env = "MEL_ENABLE", default_value_t = true, action = clap::ArgAction::Set)]
    pub enable: bool,
    /// The delay in milliseconds before an idle or failed step is retried.
    #[arg(
        long = "mel.retry-interval",
        env = "MEL_RETRY_INTERVAL",
        value_name = "MILLIS",
        default_value_t = constants::DEFAULT_RETRY_INTERVAL_MS
    )]
    pub retry_interval: u64,
    /// The target capacity of the delayed message backlog. Zero keeps every entry.
    #[arg(
        long = "mel.backlog-capacity",
        env = "MEL_BACKLOG_CAPACITY",
        default_value_t = constants::DEFAULT_BACKLOG_CAPACITY
    )]
    pub backlog_capacity: usize,
    /// The number of parent chain blocks fetched ahead of the extraction cursor.
    #[arg(
        long = "mel.blocks-to-prefetch",
        env = "MEL_BLOCKS_TO_PREFETCH",
        default_value_t = constants::DEFAULT_BLOCKS_TO_PREFETCH
    )]
    pub blocks_to_prefetch: u64,
    /// The finality a parent chain block must reach before it is extracted.
    #[arg(long = "mel.read-mode", env = "MEL_READ_MODE", value_enum, default_value_t = ReadMode::Latest)]
    pub read_mode: ReadMode,
    /// The number of consecutive failed steps before the runner reports itself stalled.
    #[arg(
        long = "mel.stall-tolerance",
        env = "MEL_STALL_TOLERANCE",
        default_value_t = constants::DEFAULT_STALL_TOLERANCE
    )]
    pub stall_tolerance: u64,
    /// The delay in milliseconds between two polls of the safe and finalized headers.
    #[arg(
        long = "mel.watchdog-interval",
        env = "MEL_WATCHDOG_INTERVAL",
        value_name = "MILLIS",
        default_value_t = constants::DEFAULT_WATCHDOG_INTERVAL_MS
    )]
    pub watchdog_interval: u64,
}

impl Default for MelArgs {
    fn default() -> Self {
        Self {
            enable: true,
            retry_interval: constants::DEFAULT_RETRY_INTERVAL_MS,
            backlog_capacity: constants::DEFAULT_BACKLOG_CAPACITY,
            blocks_to_prefetch: constants::DEFAULT_BLOCKS_TO_PREFETCH,
            read_mode: ReadMode::default(),
            stall_tolerance: constants::DEFAULT_STALL_TOLERANCE,
            watchdog_interval: constants::DEFAULT_WATCHDOG_INTERVAL_MS,
        }
    }
}

impl MelArgs {
    /// Validates the arguments into a [`MelConfig`].
    pub fn into_config(self) -> Result<MelConfig, RunnerError> {
        if self.retry_interval == 0 {
            return Err(RunnerError::InvalidConfig("retry interval must be positive".to_string()))
        }
        if self.blocks_to_prefetch == 0 {
            return Err(RunnerError::InvalidConfig(
                "at least one block must be prefetched".to_string(),
            ))
        }
        if self.watchdog_interval == 0 {
            return Err(RunnerError::InvalidConfig(
                "watchdog interval must be positive".to_string(),
            ))
        }

        Ok(MelConfig {
            enable: self.enable,
            retry_interval: Duration::from_millis(self.retry_interval),
            backlog_capacity: self.backlog_capacity,
            blocks_to_prefetch: self.blocks_to_prefetch,
            read_mode: self.read_mode,
            stall_tolerance: self.stall_tolerance,
            watchdog_interval: Duration::from_millis(self.watchdog_interval),
        })
    }
}
