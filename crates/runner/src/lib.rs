//! The runner driving the message extraction layer over the parent chain.
//!
//! The [`MelRunner`] is a finite state machine. Every step consumes an [`FsmState`] and returns
//! the next one along with the delay to wait before stepping again:
//!
//! - [`FsmState::Start`] loads the head state, rebuilds its delayed message backlog and checks
//!   the head is still canonical.
//! - [`FsmState::ProcessingNextBlock`] extracts the block following the state.
//! - [`FsmState::SavingMessages`] persists an extraction output and forwards its messages.
//! - [`FsmState::Reorging`] rewinds to the state of the parent block.

mod args;
pub use args::MelArgs;

mod config;
pub use config::{MelConfig, ReadMode};

pub mod constants;

mod consumer;
pub use consumer::{ChannelConsumer, MessageBatch, MessageConsumer};

mod error;
pub use error::{RunnerError, RunnerResult};

mod finality;
pub use finality::{FinalityWatchdog, FinalityWatermarks};

mod health;
pub use health::{HealthStatus, RunnerHealth};

mod metrics;
pub use metrics::RunnerMetrics;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use alloy_eips::BlockNumberOrTag;
use mel_db::{KeyValueStore, MelDatabase};
use mel_extraction::{extract_messages, DataSources, ExtractionOutput};
use mel_l1::EventSchema;
use mel_primitives::MelState;
use mel_providers::{BlobProvider, LiveDataSource, ParentChainClient};
use std::{fmt, sync::Arc, time::Duration};
use tokio::{sync::watch, task::JoinHandle, time::Instant};

/// The state of the [`MelRunner`] machine.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::large_enum_variant)]
pub enum FsmState {
    /// Load the head state from the database.
    Start,
    /// Extract the parent chain block following `state`.
    ProcessingNextBlock {
        /// The state after the last processed block.
        state: MelState,
    },
    /// Persist an extraction output.
    SavingMessages {
        /// The message count of the state the output was extracted on.
        pre_msg_count: u64,
        /// The extraction output.
        output: ExtractionOutput,
    },
    /// Rewind from a state whose parent chain block is no longer canonical.
    Reorging {
        /// The state to rewind from.
        dirty_state: MelState,
    },
}

impl FsmState {
    /// Returns the name of the state.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::ProcessingNextBlock { .. } => "processing_next_block",
            Self::SavingMessages { .. } => "saving_messages",
            Self::Reorging { .. } => "reorging",
        }
    }
}

impl fmt::Display for FsmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Persists `genesis` unless the database already holds a head state, and returns the head.
pub async fn initialize_state<S: KeyValueStore>(
    db: &MelDatabase<S>,
    genesis: &MelState,
) -> RunnerResult<MelState> {
    if let Some(head) = db.fetch_initial_state().await? {
        return Ok(head)
    }
    db.save_state(genesis).await?;
    tracing::info!(
        target: "mel::runner",
        block = genesis.parent_chain_block_number,
        hash = ?genesis.parent_chain_block_hash,
        "initialized mel state from genesis"
    );
    Ok(genesis.clone())
}

/// Extracts the messages of the parent chain block by block.
pub struct MelRunner<C, S, B, M> {
    config: MelConfig,
    schema: EventSchema,
    db: MelDatabase<S>,
    source: LiveDataSource<C>,
    blobs: B,
    consumer: M,
    watermarks: FinalityWatermarks,
    health: RunnerHealth,
    metrics: RunnerMetrics,
    /// The block number up to which headers were prefetched, exclusive.
    prefetched_to: u64,
}

impl<C, S, B, M> fmt::Debug for MelRunner<C, S, B, M>
where
    C: fmt::Debug,
    S: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MelRunner")
            .field("config", &self.config)
            .field("db", &self.db)
            .field("source", &self.source)
            .field("watermarks", &self.watermarks)
            .field("health", &self.health.status())
            .field("prefetched_to", &self.prefetched_to)
            .finish_non_exhaustive()
    }
}

impl<C, S, B, M> MelRunner<C, S, B, M>
where
    C: ParentChainClient,
    S: KeyValueStore,
    B: BlobProvider,
    M: MessageConsumer,
{
    /// Returns a new [`MelRunner`].
    pub fn new(
        config: MelConfig,
        schema: EventSchema,
        db: MelDatabase<S>,
        source: LiveDataSource<C>,
        blobs: B,
        consumer: M,
    ) -> Self {
        let health = RunnerHealth::new(config.stall_tolerance);
        Self {
            config,
            schema,
            db,
            source,
            blobs,
            consumer,
            watermarks: FinalityWatermarks::default(),
            health,
            metrics: RunnerMetrics::default(),
            prefetched_to: 0,
        }
    }

    /// Returns the configuration.
    pub const fn config(&self) -> &MelConfig {
        &self.config
    }

    /// Returns the database.
    pub const fn db(&self) -> &MelDatabase<S> {
        &self.db
    }

    /// Returns the finality watermarks read by the runner.
    pub const fn watermarks(&self) -> &FinalityWatermarks {
        &self.watermarks
    }

    /// Returns the health of the runner.
    pub const fn health(&self) -> &RunnerHealth {
        &self.health
    }

    /// Runs the action of `fsm` and returns the next state along with the delay to wait before
    /// stepping into it.
    #[tracing::instrument(target = "mel::runner", skip_all, fields(state = fsm.name()))]
    pub async fn step(&mut self, fsm: FsmState) -> RunnerResult<(FsmState, Duration)> {
        match fsm {
            FsmState::Start => self.start().await,
            FsmState::ProcessingNextBlock { state } => self.process_next_block(state).await,
            FsmState::SavingMessages { pre_msg_count, output } => {
                self.save_messages(pre_msg_count, output).await
            }
            FsmState::Reorging { dirty_state } => self.reorg(dirty_state).await,
        }
    }

    /// Steps the machine from [`FsmState::Start`] until the shutdown signal fires. A failed step is
    /// retried after the retry interval.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut fsm = FsmState::Start;
        loop {
            let result = tokio::select! {
                result = self.step(fsm.clone()) => result,
                _ = shutdown.changed() => break,
            };

            let delay = match result {
                Ok((next, delay)) => {
                    self.health.record_success();
                    self.metrics.stuck_steps.set(0.0);
                    fsm = next;
                    delay
                }
                Err(err) => {
                    let failures = self.health.record_failure();
                    self.metrics.stuck_steps.set(failures as f64);
                    if self.health.status().is_stalled() {
                        tracing::error!(target: "mel::runner", %fsm, failures, %err, "mel runner is stalled");
                    } else {
                        tracing::warn!(target: "mel::runner", %fsm, failures, %err, "mel runner step failed");
                    }
                    self.config.retry_interval
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
        }
        tracing::info!(target: "mel::runner", "mel runner stopped");
    }

    async fn start(&mut self) -> RunnerResult<(FsmState, Duration)> {
        let mut head = self.db.head_state().await?;
        let watermark = self.initial_watermark(&head).await?;
        self.db
            .initialize_delayed_backlog(
                &mut head,
                watermark,
                self.config.backlog_capacity,
                Some(Arc::new(self.watermarks.clone())),
            )
            .await?;
        self.watermarks
            .publish_read_count(head.parent_chain_block_number, head.delayed_messages_read);
        self.metrics.head_block_number.set(head.parent_chain_block_number as f64);

        // cached headers may predate a reorg that happened while stopped.
        self.source.clear_cache();
        self.prefetched_to = 0;
        let number = head.parent_chain_block_number;
        match self.source.header_by_number(number).await? {
            Some(header) if header.hash() != head.parent_chain_block_hash => {
                tracing::info!(target: "mel::runner", number, expected = ?head.parent_chain_block_hash, got = ?header.hash(), "head state is not canonical");
                Ok((FsmState::Reorging { dirty_state: head }, Duration::ZERO))
            }
            Some(_) => {
                tracing::info!(target: "mel::runner", number, msg_count = head.msg_count, delayed_messages_read = head.delayed_messages_read, "starting mel runner");
                Ok((FsmState::ProcessingNextBlock { state: head }, Duration::ZERO))
            }
            None => {
                tracing::debug!(target: "mel::runner", number, "head block not found on the parent chain");
                Ok((FsmState::Start, self.config.retry_interval))
            }
        }
    }

    /// Returns the delayed read count of the latest persisted state at or below the finalized
    /// block, if the finalized block is known.
    async fn initial_watermark(&self, head: &MelState) -> RunnerResult<Option<u64>> {
        let finalized = match self.watermarks.finalized() {
            Some(finalized) => Some(finalized),
            None => self
                .source
                .client()
                .header_by_number(BlockNumberOrTag::Finalized)
                .await?
                .map(|header| header.number),
        };
        let Some(finalized) = finalized else { return Ok(None) };
        self.watermarks.set_finalized(finalized);

        if finalized >= head.parent_chain_block_number {
            return Ok(Some(head.delayed_messages_read))
        }
        let Some(state) = self.db.state(finalized).await? else { return Ok(None) };
        self.watermarks.publish_read_count(finalized, state.delayed_messages_read);
        Ok(Some(state.delayed_messages_read))
    }

    /// Returns the highest block the read mode allows to extract, [`None`] if it is unknown.
    fn read_ceiling(&self) -> Option<u64> {
        match self.config.read_mode {
            ReadMode::Latest => Some(u64::MAX),
            ReadMode::Safe => self.watermarks.safe(),
            ReadMode::Finalized => self.watermarks.finalized(),
        }
    }

    async fn process_next_block(&mut self, state: MelState) -> RunnerResult<(FsmState, Duration)> {
        let next = state.parent_chain_block_number + 1;
        let retry = self.config.retry_interval;

        if !matches!(self.read_ceiling(), Some(ceiling) if ceiling >= next) {
            tracing::trace!(target: "mel::runner", next, read_mode = ?self.config.read_mode, "waiting on parent chain finality");
            return Ok((FsmState::ProcessingNextBlock { state }, retry))
        }

        if next >= self.prefetched_to {
            let fetched = self.source.prefetch(next, self.config.blocks_to_prefetch).await?;
            // at the tip, wait for `next` header by header until it lands.
            self.prefetched_to = next + (fetched as u64).max(1);
        }

        let Some(header) = self.source.header_by_number(next).await? else {
            tracing::trace!(target: "mel::runner", next, "waiting on the next parent chain block");
            return Ok((FsmState::ProcessingNextBlock { state }, retry))
        };

        if header.parent_hash != state.parent_chain_block_hash {
            tracing::info!(target: "mel::runner", number = next, expected = ?state.parent_chain_block_hash, got = ?header.parent_hash, "parent chain reorg detected");
            return Ok((FsmState::Reorging { dirty_state: state }, Duration::ZERO))
        }

        let sources = DataSources {
            schema: &self.schema,
            logs: &self.source,
            transactions: &self.source,
            delayed_messages: &self.db,
            blobs: &self.blobs,
        };
        let started = Instant::now();
        let result = extract_messages(&state, &header, &sources).await;
        self.metrics.extraction_duration.record(started.elapsed().as_secs_f64());

        match result {
            Ok(output) => {
                let pre_msg_count = state.msg_count;
                Ok((FsmState::SavingMessages { pre_msg_count, output }, Duration::ZERO))
            }
            Err(err) => {
                if err.is_reorg() {
                    return Ok((FsmState::Reorging { dirty_state: state }, Duration::ZERO))
                }
                if !err.is_retryable() {
                    tracing::error!(target: "mel::runner", number = next, %err, "parent chain block failed validation");
                }
                Err(err.into())
            }
        }
    }

    async fn save_messages(
        &mut self,
        pre_msg_count: u64,
        mut output: ExtractionOutput,
    ) -> RunnerResult<(FsmState, Duration)> {
        if let Some(backlog) = output.state.delayed_backlog_mut() {
            backlog.commit_dirties();
        }
        let state = &output.state;
        self.db.save_batch_metas(output.first_batch_sequence_number(), &output.batch_metas).await?;
        self.db
            .save_delayed_messages(output.first_delayed_message_index(), &output.delayed_messages)
            .await?;
        self.consumer.push_messages(pre_msg_count, &output.messages).await?;
        self.db.save_state(state).await?;
        self.watermarks
            .publish_read_count(state.parent_chain_block_number, state.delayed_messages_read);
        self.metrics.record_output(&output);

        tracing::debug!(
            target: "mel::runner",
            number = state.parent_chain_block_number,
            messages = output.messages.len(),
            msg_count = state.msg_count,
            "saved parent chain block"
        );
        Ok((FsmState::ProcessingNextBlock { state: output.state }, Duration::ZERO))
    }

    async fn reorg(&mut self, mut dirty_state: MelState) -> RunnerResult<(FsmState, Duration)> {
        let number = dirty_state.parent_chain_block_number;
        if number == 0 {
            return Err(RunnerError::ReorgPastGenesis)
        }
        let target = number - 1;
        let mut previous = match self.db.state(target).await? {
            Some(state) => state,
            None => return Err(RunnerError::MissingReorgTarget(target)),
        };

        if let Some(mut backlog) = dirty_state.take_delayed_backlog() {
            backlog.discard_dirties();
            backlog.reorg(previous.delayed_messages_seen)?;
            previous.set_delayed_backlog(backlog);
        }

        self.source.clear_cache();
        self.prefetched_to = 0;
        self.metrics.reorgs.increment(1);
        self.metrics.head_block_number.set(target as f64);
        tracing::info!(
            target: "mel::runner",
            from = number,
            to = target,
            msg_count = previous.msg_count,
            delayed_messages_seen = previous.delayed_messages_seen,
            "rewound mel state"
        );
        Ok((FsmState::ProcessingNextBlock { state: previous }, Duration::ZERO))
    }
}

impl<C, S, B, M> MelRunner<C, S, B, M>
where
    C: ParentChainClient + Clone + 'static,
    S: KeyValueStore + 'static,
    B: BlobProvider + 'static,
    M: MessageConsumer + 'static,
{
    /// Spawns the runner and the finality watchdog. The watchdog runs in every read mode, since
    /// the finalized block also bounds the trimming of the delayed message backlog.
    pub fn spawn(self) -> MelRunnerHandle {
        let (shutdown, receiver) = watch::channel(false);
        let watchdog = FinalityWatchdog::new(
            self.source.client().clone(),
            self.watermarks.clone(),
            self.config.watchdog_interval,
        );
        let mut tasks = Vec::with_capacity(2);
        tasks.push(watchdog.spawn(receiver.clone()));

        let health = self.health.clone();
        let watermarks = self.watermarks.clone();
        tasks.push(tokio::spawn(self.run(receiver)));
        MelRunnerHandle { shutdown, health, watermarks, tasks }
    }
}

/// A handle to a spawned [`MelRunner`].
#[derive(Debug)]
pub struct MelRunnerHandle {
    shutdown: watch::Sender<bool>,
    health: RunnerHealth,
    watermarks: FinalityWatermarks,
    tasks: Vec<JoinHandle<()>>,
}

impl MelRunnerHandle {
    /// Returns the health of the runner.
    pub const fn health(&self) -> &RunnerHealth {
        &self.health
    }

    /// Returns the finality watermarks of the runner.
    pub const fn watermarks(&self) -> &FinalityWatermarks {
        &self.watermarks
    }

    /// Signals the runner to stop and waits for its tasks to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(err) = task.await {
                tracing::error!(target: "mel::runner", ?err, "mel runner task panicked");
            }
        }
    }
}
