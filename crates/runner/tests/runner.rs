//! The mel runner state machine over a mock parent chain.

use alloy_consensus::TxEnvelope;
use alloy_primitives::{Bytes, Log, B256};
use mel_codec::{segment, SegmentKind};
use mel_db::{MelDatabase, MemoryKeyValueStore};
use mel_extraction::test_utils::TestInbox;
use mel_primitives::{
    kind, test_utils::header, BatchDataLocation, FinalizedReadOracle, MelState, ParentChainHeader,
};
use mel_providers::{test_utils::MockParentChain, LiveDataSource};
use mel_runner::{
    initialize_state,
    test_utils::{test_runner, RecordingConsumer, TestRunner},
    FsmState, MelConfig, MelRunner, ReadMode, RunnerError,
};
use std::time::Duration;

const RETRY_INTERVAL: Duration = Duration::from_millis(10);

fn config() -> MelConfig {
    MelConfig { retry_interval: RETRY_INTERVAL, ..Default::default() }
}

fn l2(payload: &[u8]) -> Bytes {
    segment(SegmentKind::L2Message, payload)
}

fn payloads(consumer: &RecordingConsumer) -> Vec<Bytes> {
    consumer.messages().into_iter().map(|m| m.message.l2_msg).collect()
}

/// Steps the runner `steps` times from `fsm`.
async fn step_n(
    runner: &mut TestRunner,
    mut fsm: FsmState,
    steps: usize,
) -> eyre::Result<FsmState> {
    for _ in 0..steps {
        fsm = runner.step(fsm).await?.0;
    }
    Ok(fsm)
}

/// Returns the state the machine is about to extract on top of.
fn processing(fsm: &FsmState) -> eyre::Result<&MelState> {
    match fsm {
        FsmState::ProcessingNextBlock { state } => Ok(state),
        other => eyre::bail!("expected processing_next_block, got {other}"),
    }
}

async fn wait_for_head(db: &MelDatabase<MemoryKeyValueStore>, number: u64) -> eyre::Result<()> {
    tokio::time::timeout(Duration::from_secs(60), async {
        while db.head_block_number().await? != Some(number) {
            tokio::time::sleep(RETRY_INTERVAL).await;
        }
        Ok::<_, eyre::Report>(())
    })
    .await??;
    Ok(())
}

/// A mock parent chain along with the inbox fixture posting to it.
struct Fixture {
    chain: MockParentChain,
    inbox: TestInbox,
    head: ParentChainHeader,
}

impl Fixture {
    fn new() -> Self {
        let chain = MockParentChain::default();
        let genesis = header(0, B256::ZERO, 0);
        chain.push_block(genesis.clone(), Vec::new());
        Self { chain, inbox: TestInbox::default(), head: genesis }
    }

    fn next_number(&self) -> u64 {
        self.head.number + 1
    }

    /// Appends a block of the `fork` chain on top of the head.
    fn push(&mut self, fork: u8, transactions: Vec<(TxEnvelope, Vec<Log>)>) -> ParentChainHeader {
        let block = header(self.next_number(), self.head.hash(), fork);
        self.chain.push_block(block.clone(), transactions);
        self.head = block.clone();
        block
    }

    /// Drops every block above `head` and restores the inbox to `inbox`.
    fn rewind(&mut self, head: ParentChainHeader, inbox: TestInbox) {
        self.chain.truncate(head.number + 1);
        self.head = head;
        self.inbox = inbox;
    }
}

#[tokio::test]
async fn test_initialize_state_keeps_existing_head() -> eyre::Result<()> {
    // Given
    let inbox = TestInbox::default();
    let db = MelDatabase::new(MemoryKeyValueStore::default());
    let genesis = inbox.genesis_state(&header(0, B256::ZERO, 0));
    let other = inbox.genesis_state(&header(7, B256::ZERO, 0));

    // When
    let first = initialize_state(&db, &genesis).await?;
    let second = initialize_state(&db, &other).await?;

    // Then
    assert_eq!(first.hash(), genesis.hash());
    assert_eq!(second.hash(), genesis.hash());
    assert_eq!(db.head_block_number().await?, Some(0));
    Ok(())
}

#[tokio::test]
async fn test_runner_extracts_and_saves_blocks() -> eyre::Result<()> {
    // Given
    let mut fixture = Fixture::new();
    let number = fixture.next_number();
    let batch = fixture.inbox.batch(
        number,
        0,
        0,
        &[l2(b"foobar"), l2(b"barfoo")],
        BatchDataLocation::SeparateBatchEvent,
    );
    let block = fixture.push(0, vec![batch]);
    let (mut runner, consumer) = test_runner(&fixture.chain, &fixture.inbox, config()).await;

    // When
    let (started, delay) = runner.step(FsmState::Start).await?;
    let extracted = runner.step(started.clone()).await?.0;
    let saved = runner.step(extracted.clone()).await?.0;
    let (idle, idle_delay) = runner.step(saved.clone()).await?;

    // Then
    assert_eq!(delay, Duration::ZERO);
    assert_eq!(processing(&started)?.parent_chain_block_number, 0);
    assert!(matches!(extracted, FsmState::SavingMessages { pre_msg_count: 0, .. }));

    let state = processing(&saved)?;
    assert_eq!(state.parent_chain_block_hash, block.hash());
    assert_eq!(state.msg_count, 2);
    assert_eq!(
        payloads(&consumer),
        vec![Bytes::from_static(b"foobar"), Bytes::from_static(b"barfoo")]
    );
    assert_eq!(consumer.pushes(), vec![0]);

    let db = runner.db();
    assert_eq!(db.head_block_number().await?, Some(number));
    assert_eq!(db.head_state().await?.hash(), state.hash());
    assert_eq!(db.batch_metadata(0).await?.map(|meta| meta.message_count), Some(2));
    assert!(db.delayed_message(0).await?.is_some());

    // the next block is not produced yet.
    assert_eq!(processing(&idle)?.parent_chain_block_number, number);
    assert_eq!(idle_delay, RETRY_INTERVAL);
    Ok(())
}

#[tokio::test]
async fn test_runner_waits_for_safe_blocks() -> eyre::Result<()> {
    // Given
    let mut fixture = Fixture::new();
    let batch = fixture.inbox.batch(
        fixture.next_number(),
        0,
        0,
        &[l2(b"foobar")],
        BatchDataLocation::TxInput,
    );
    fixture.push(0, vec![batch]);
    let config = MelConfig { read_mode: ReadMode::Safe, ..config() };
    let (mut runner, consumer) = test_runner(&fixture.chain, &fixture.inbox, config).await;
    let started = runner.step(FsmState::Start).await?.0;

    // When
    let (waiting, delay) = runner.step(started).await?;
    runner.watermarks().set_safe(1);
    let extracted = runner.step(waiting.clone()).await?.0;

    // Then
    assert_eq!(processing(&waiting)?.parent_chain_block_number, 0);
    assert_eq!(delay, RETRY_INTERVAL);
    assert!(matches!(extracted, FsmState::SavingMessages { .. }));
    assert!(consumer.messages().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_runner_rewinds_on_reorg() -> eyre::Result<()> {
    // Given
    let mut fixture = Fixture::new();
    let deposit = fixture.inbox.delayed_message(
        fixture.next_number(),
        kind::L2_MESSAGE,
        Bytes::from_static(b"deposit"),
    );
    let first = fixture.push(0, vec![deposit]);
    let snapshot = fixture.inbox.clone();
    let number = fixture.next_number();
    let batch = fixture.inbox.batch(number, 0, 1, &[], BatchDataLocation::SeparateBatchEvent);
    fixture.push(0, vec![batch]);

    let (mut runner, consumer) = test_runner(&fixture.chain, &fixture.inbox, config()).await;
    let before = step_n(&mut runner, FsmState::Start, 5).await?;
    assert_eq!(processing(&before)?.parent_chain_block_number, 2);
    assert_eq!(payloads(&consumer), vec![Bytes::from_static(b"deposit")]);

    // a competing block 2 does not read the deposit.
    fixture.rewind(first, snapshot);
    let batch = fixture.inbox.batch(
        fixture.next_number(),
        0,
        0,
        &[l2(b"reorged")],
        BatchDataLocation::SeparateBatchEvent,
    );
    let reorged = fixture.push(1, vec![batch]);
    fixture.push(1, Vec::new());

    // When
    let detected = runner.step(before).await?.0;
    let rewound = runner.step(detected.clone()).await?.0;
    let after = step_n(&mut runner, rewound.clone(), 2).await?;

    // Then
    assert!(matches!(
        &detected,
        FsmState::Reorging { dirty_state } if dirty_state.parent_chain_block_number == 2
    ));
    assert_eq!(processing(&rewound)?.parent_chain_block_number, 1);

    let state = processing(&after)?;
    assert_eq!(state.parent_chain_block_hash, reorged.hash());
    assert_eq!(state.delayed_messages_seen, 2);
    assert_eq!(state.delayed_messages_read, 0);
    let backlog = state.delayed_backlog().expect("attached backlog");
    assert_eq!((backlog.len(), backlog.dirty_len()), (2, 0));

    assert_eq!(payloads(&consumer), vec![Bytes::from_static(b"reorged")]);
    assert_eq!(consumer.pushes(), vec![0, 0]);
    assert_eq!(runner.db().head_state().await?.hash(), state.hash());

    // the machine carries on along the new chain.
    let next = step_n(&mut runner, after, 2).await?;
    assert_eq!(processing(&next)?.parent_chain_block_number, 3);
    Ok(())
}

#[tokio::test]
async fn test_start_rewinds_non_canonical_head() -> eyre::Result<()> {
    // Given
    let mut fixture = Fixture::new();
    let genesis = fixture.head.clone();
    let snapshot = fixture.inbox.clone();
    let deposit = fixture.inbox.delayed_message(
        fixture.next_number(),
        kind::L2_MESSAGE,
        Bytes::from_static(b"deposit"),
    );
    fixture.push(0, vec![deposit]);
    let (mut runner, _consumer) = test_runner(&fixture.chain, &fixture.inbox, config()).await;
    step_n(&mut runner, FsmState::Start, 3).await?;

    // the head block is replaced while the runner is stopped.
    fixture.rewind(genesis, snapshot);
    let replacement = fixture.push(1, Vec::new());

    // When
    let started = runner.step(FsmState::Start).await?.0;
    let rewound = runner.step(started.clone()).await?.0;
    let after = step_n(&mut runner, rewound.clone(), 2).await?;

    // Then
    assert!(matches!(
        &started,
        FsmState::Reorging { dirty_state } if dirty_state.delayed_messages_seen == 1
    ));
    let rewound = processing(&rewound)?;
    assert_eq!(rewound.parent_chain_block_number, 0);
    assert_eq!(rewound.delayed_messages_seen, 0);

    let state = processing(&after)?;
    assert_eq!(state.parent_chain_block_hash, replacement.hash());
    assert_eq!(state.delayed_messages_seen, 0);
    Ok(())
}

#[tokio::test]
async fn test_reorg_past_genesis_fails() -> eyre::Result<()> {
    // Given
    let fixture = Fixture::new();
    let (mut runner, _consumer) = test_runner(&fixture.chain, &fixture.inbox, config()).await;
    let genesis = fixture.inbox.genesis_state(&fixture.head);

    // When
    let res = runner.step(FsmState::Reorging { dirty_state: genesis }).await;

    // Then
    assert!(matches!(res, Err(RunnerError::ReorgPastGenesis)));
    Ok(())
}

#[tokio::test]
async fn test_reorg_without_persisted_parent_fails() -> eyre::Result<()> {
    // Given
    let fixture = Fixture::new();
    let (mut runner, _consumer) = test_runner(&fixture.chain, &fixture.inbox, config()).await;
    let mut dirty_state = fixture.inbox.genesis_state(&fixture.head);
    dirty_state.parent_chain_block_number = 5;

    // When
    let res = runner.step(FsmState::Reorging { dirty_state }).await;

    // Then
    assert!(matches!(res, Err(RunnerError::MissingReorgTarget(4))));
    Ok(())
}

#[tokio::test]
async fn test_invalid_block_leaves_backlog_untouched() -> eyre::Result<()> {
    // Given
    let mut fixture = Fixture::new();
    let batch =
        fixture.inbox.batch(fixture.next_number(), 0, 0, &[l2(b"a")], BatchDataLocation::TxInput);
    fixture.push(0, vec![batch]);
    let batch =
        fixture.inbox.batch(fixture.next_number(), 2, 0, &[l2(b"b")], BatchDataLocation::TxInput);
    fixture.push(0, vec![batch]);
    let (mut runner, consumer) = test_runner(&fixture.chain, &fixture.inbox, config()).await;
    let saved = step_n(&mut runner, FsmState::Start, 3).await?;

    // When
    let res = runner.step(saved.clone()).await;
    let retried = runner.step(saved.clone()).await;

    // Then
    assert!(matches!(res, Err(RunnerError::Extraction(ref err)) if !err.is_reorg()));
    assert!(matches!(retried, Err(RunnerError::Extraction(_))));
    let state = processing(&saved)?;
    let backlog = state.delayed_backlog().expect("attached backlog");
    assert_eq!((backlog.len(), backlog.dirty_len()), (1, 0));
    assert_eq!(runner.db().head_block_number().await?, Some(1));
    assert_eq!(payloads(&consumer), vec![Bytes::from_static(b"a")]);
    Ok(())
}

#[tokio::test]
async fn test_idle_runner_does_not_refetch_the_prefetch_window() -> eyre::Result<()> {
    // Given
    let mut fixture = Fixture::new();
    let batch =
        fixture.inbox.batch(fixture.next_number(), 0, 0, &[l2(b"a")], BatchDataLocation::TxInput);
    fixture.push(0, vec![batch]);
    let (mut runner, consumer) = test_runner(&fixture.chain, &fixture.inbox, config()).await;
    let saved = step_n(&mut runner, FsmState::Start, 3).await?;
    let mut idle = runner.step(saved).await?.0;
    let queries = fixture.chain.log_queries();

    // When
    for _ in 0..5 {
        idle = runner.step(idle).await?.0;
    }
    let idle_queries = fixture.chain.log_queries() - queries;
    let batch =
        fixture.inbox.batch(fixture.next_number(), 1, 0, &[l2(b"b")], BatchDataLocation::TxInput);
    fixture.push(0, vec![batch]);
    let saved = step_n(&mut runner, idle, 2).await?;

    // Then
    assert_eq!(idle_queries, 0);
    assert_eq!(processing(&saved)?.parent_chain_block_number, 2);
    assert_eq!(payloads(&consumer), vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_latest_mode_tracks_finality() -> eyre::Result<()> {
    // Given
    let mut fixture = Fixture::new();
    for number in 1..=4u8 {
        let deposit =
            fixture.inbox.delayed_message(number.into(), kind::L2_MESSAGE, Bytes::from(vec![number]));
        fixture.push(0, vec![deposit]);
    }
    let config = MelConfig { read_mode: ReadMode::Latest, ..config() };
    let watchdog_interval = config.watchdog_interval;
    let (runner, _consumer) = test_runner(&fixture.chain, &fixture.inbox, config).await;
    let db = runner.db().clone();

    // When
    let handle = runner.spawn();
    wait_for_head(&db, 4).await?;
    let unknown = handle.watermarks().finalized();
    fixture.chain.set_finalized(3);
    tokio::time::sleep(watchdog_interval * 2).await;
    let deposit =
        fixture.inbox.delayed_message(5, kind::L2_MESSAGE, Bytes::from_static(b"five"));
    fixture.push(0, vec![deposit]);
    wait_for_head(&db, 5).await?;

    // Then
    let watermarks = handle.watermarks();
    assert_eq!(unknown, None);
    assert_eq!(watermarks.finalized(), Some(3));
    assert_eq!(watermarks.finalized_and_read_index(), Ok(0));
    // read counts below the finalized block are dropped.
    assert_eq!(watermarks.published_count(), 3);
    handle.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_spawned_runner_follows_finalized_chain() -> eyre::Result<()> {
    // Given
    let mut fixture = Fixture::new();
    for payload in [b"one", b"two"] {
        let number = fixture.next_number();
        let sequence_number = number - 1;
        let batch = fixture.inbox.batch(
            number,
            sequence_number,
            0,
            &[l2(payload)],
            BatchDataLocation::SeparateBatchEvent,
        );
        fixture.push(0, vec![batch]);
    }
    fixture.chain.set_finalized(1);
    let config = MelConfig { read_mode: ReadMode::Finalized, ..config() };
    let (runner, consumer) = test_runner(&fixture.chain, &fixture.inbox, config).await;
    let db = runner.db().clone();

    // When
    let handle = runner.spawn();
    wait_for_head(&db, 1).await?;
    tokio::time::sleep(Duration::from_secs(1)).await;
    let held = db.head_block_number().await?;
    fixture.chain.set_finalized(2);
    wait_for_head(&db, 2).await?;

    // Then
    assert_eq!(held, Some(1));
    assert_eq!(
        payloads(&consumer),
        vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")]
    );
    assert!(!handle.health().status().is_stalled());
    assert_eq!(handle.watermarks().finalized(), Some(2));
    handle.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_failing_runner_reports_stall() -> eyre::Result<()> {
    // Given
    let fixture = Fixture::new();
    let config = MelConfig { stall_tolerance: 3, ..config() };
    // no head state is persisted, so the start step fails.
    let runner = MelRunner::new(
        config,
        fixture.inbox.schema.clone(),
        MelDatabase::new(MemoryKeyValueStore::default()),
        LiveDataSource::new(fixture.chain.clone(), &fixture.inbox.schema, 16),
        fixture.inbox.blobs.clone(),
        RecordingConsumer::default(),
    );

    // When
    let handle = runner.spawn();
    tokio::time::timeout(Duration::from_secs(60), async {
        while !handle.health().status().is_stalled() {
            tokio::time::sleep(RETRY_INTERVAL).await;
        }
    })
    .await?;

    // Then
    assert!(handle.health().status().is_stalled());
    handle.shutdown().await;
    Ok(())
}
