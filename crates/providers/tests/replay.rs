//! Equivalence of the live and replay readers over the extraction state accumulators.

use alloy_primitives::B256;
use mel_db::test_utils::setup_test_db;
use mel_primitives::{
    random, DelayedInboxMessage, DelayedMessageBacklog, L1IncomingMessage, MelState,
    MessageWithMetadata,
};
use mel_providers::{
    replay::{
        record_delayed_message_preimages, record_message_preimages, MemoryPreimageResolver,
        ReplayDelayedMessageReader, ReplayMessageReader,
    },
    DelayedMessageDatabase, ProviderError,
};

fn delayed_messages(count: u64) -> Vec<DelayedInboxMessage> {
    let mut acc = B256::ZERO;
    (0..count)
        .map(|_| {
            let mut message = random!(L1IncomingMessage);
            message.batch_gas_cost = None;
            let delayed = DelayedInboxMessage { before_inbox_acc: acc, message };
            acc = delayed.after_inbox_acc();
            delayed
        })
        .collect()
}

fn resolver(preimages: Vec<(B256, Vec<u8>)>) -> eyre::Result<MemoryPreimageResolver> {
    let resolver = MemoryPreimageResolver::default();
    resolver.extend_keccak(preimages)?;
    Ok(resolver)
}

#[tokio::test]
async fn test_replay_delayed_message_from_root() -> eyre::Result<()> {
    // Given
    let messages = delayed_messages(4);
    let mut state = MelState::default();
    for message in &messages {
        state.accumulate_delayed_message(message)?;
    }
    state.generate_roots();
    let (root, preimages) = record_delayed_message_preimages(&messages);
    let reader = ReplayDelayedMessageReader::new(resolver(preimages)?);

    // When
    let message = reader.read_delayed_message(&state, 2).await?;

    // Then
    assert_eq!(root, state.delayed_messages_seen_root);
    assert_eq!(message.as_ref(), Some(&messages[2]));
    assert!(matches!(
        reader.read_delayed_message(&state, 4).await,
        Err(ProviderError::DelayedMessageNotSeen { index: 4, seen: 4 })
    ));
    Ok(())
}

#[tokio::test]
async fn test_database_and_replay_delayed_readers_agree() -> eyre::Result<()> {
    // Given
    let db = setup_test_db().await;
    let messages = delayed_messages(11);
    let mut state = MelState::default();
    state.set_delayed_backlog(DelayedMessageBacklog::new(0, None));
    for message in &messages {
        state.accumulate_delayed_message(message)?;
    }
    state.generate_roots();
    db.save_delayed_messages(0, &messages).await?;

    let (_, preimages) = record_delayed_message_preimages(&messages);
    let replay = ReplayDelayedMessageReader::new(resolver(preimages)?);

    for index in 0..messages.len() as u64 {
        // When
        let live = DelayedMessageDatabase::read_delayed_message(&db, &state, index).await?;
        let replayed = replay.read_delayed_message(&state, index).await?;

        // Then
        let (live, replayed) = live.zip(replayed).ok_or_else(|| eyre::eyre!("missing message"))?;
        assert_eq!(live, messages[index as usize]);
        assert_eq!(live, replayed);
        assert_eq!(alloy_rlp::encode(&live), alloy_rlp::encode(&replayed));
    }
    Ok(())
}

#[tokio::test]
async fn test_replay_messages_from_root() -> eyre::Result<()> {
    // Given
    let messages: Vec<_> = (0..7).map(|_| random!(MessageWithMetadata)).collect();
    let mut state = MelState::default();
    messages.iter().for_each(|message| state.accumulate_message(message));
    state.generate_roots();
    let (root, preimages) = record_message_preimages(&messages);
    let reader = ReplayMessageReader::new(resolver(preimages)?);

    // Then
    assert_eq!(root, state.message_accumulator_root);
    for (index, message) in messages.iter().enumerate() {
        assert_eq!(&reader.read_message(&state, index as u64).await?, message);
    }
    assert!(reader.read_message(&state, 7).await.is_err());
    Ok(())
}
