use crate::{
    error::{DatabaseError, DatabaseResult},
    store::{KeyValueStore, WriteBatch},
};
use alloy_rlp::Decodable;
use mel_primitives::{
    BatchMetadata, DelayedInboxMessage, DelayedMessageBacklog,
    DelayedMessageBacklogEntry, FinalizedReadOracle, MelState,
};
use std::sync::Arc;

const STATE_PREFIX: &[u8] = b"l";
const DELAYED_MESSAGE_PREFIX: &[u8] = b"y";
const BATCH_METADATA_PREFIX: &[u8] = b"s";
const HEAD_STATE_KEY: &[u8] = b"_headMelStateBlockNum";

fn key(prefix: &[u8], position: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 8);
    key.extend_from_slice(prefix);
    key.extend_from_slice(&position.to_be_bytes());
    key
}

/// The message extraction store.
///
/// Persists the [`MelState`] per parent chain block, delayed messages per global index and
/// [`BatchMetadata`] per sequence number on top of a [`KeyValueStore`]. All values are RLP
/// encoded.
#[derive(Debug, Clone)]
pub struct MelDatabase<S> {
    store: S,
}

impl<S: KeyValueStore> MelDatabase<S> {
    /// Returns a new [`MelDatabase`] over the store.
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    async fn get_decoded<T: Decodable>(&self, key: &[u8]) -> DatabaseResult<Option<T>> {
        let Some(value) = self.store.get(key).await? else { return Ok(None) };
        Ok(Some(T::decode(&mut value.as_slice())?))
    }

    /// Returns the state persisted for the parent chain block.
    pub async fn state(&self, block_number: u64) -> DatabaseResult<Option<MelState>> {
        self.get_decoded(&key(STATE_PREFIX, block_number)).await
    }

    /// Returns the parent chain block number of the head state.
    pub async fn head_block_number(&self) -> DatabaseResult<Option<u64>> {
        self.get_decoded(HEAD_STATE_KEY).await
    }

    /// Returns the head state.
    pub async fn head_state(&self) -> DatabaseResult<MelState> {
        let number = self.head_block_number().await?.ok_or(DatabaseError::MissingHeadState)?;
        self.state(number).await?.ok_or(DatabaseError::MissingState(number))
    }

    /// Returns the head state if the store was initialized.
    pub async fn fetch_initial_state(&self) -> DatabaseResult<Option<MelState>> {
        match self.head_state().await {
            Ok(state) => Ok(Some(state)),
            Err(DatabaseError::MissingHeadState) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Persists the state and moves the head pointer to it in a single batch.
    #[tracing::instrument(target = "mel::db", skip_all, fields(block = state.parent_chain_block_number))]
    pub async fn save_state(&self, state: &MelState) -> DatabaseResult<()> {
        let number = state.parent_chain_block_number;
        let mut batch = WriteBatch::default();
        batch.put(key(STATE_PREFIX, number), alloy_rlp::encode(state));
        batch.put(HEAD_STATE_KEY.to_vec(), alloy_rlp::encode(number));
        self.store.write(batch).await?;
        tracing::trace!(target: "mel::db", number, msg_count = state.msg_count, "saved mel state");
        Ok(())
    }

    /// Persists delayed messages with consecutive indices starting at `first_index`.
    pub async fn save_delayed_messages(
        &self,
        first_index: u64,
        messages: &[DelayedInboxMessage],
    ) -> DatabaseResult<()> {
        let mut batch = WriteBatch::default();
        for (index, message) in (first_index..).zip(messages) {
            batch.put(key(DELAYED_MESSAGE_PREFIX, index), alloy_rlp::encode(message));
        }
        self.store.write(batch).await
    }

    /// Persists batch metadata with consecutive sequence numbers starting at `first_seq`.
    pub async fn save_batch_metas(
        &self,
        first_seq: u64,
        metas: &[BatchMetadata],
    ) -> DatabaseResult<()> {
        let mut batch = WriteBatch::default();
        for (seq, meta) in (first_seq..).zip(metas) {
            batch.put(key(BATCH_METADATA_PREFIX, seq), alloy_rlp::encode(meta));
        }
        self.store.write(batch).await
    }

    /// Returns the metadata of the batch.
    pub async fn batch_metadata(&self, seq: u64) -> DatabaseResult<Option<BatchMetadata>> {
        self.get_decoded(&key(BATCH_METADATA_PREFIX, seq)).await
    }

    /// Returns the stored delayed message without checking it against any state.
    pub async fn delayed_message(&self, index: u64) -> DatabaseResult<Option<DelayedInboxMessage>> {
        self.get_decoded(&key(DELAYED_MESSAGE_PREFIX, index)).await
    }

    /// Returns the delayed message at `index`, checked against the witness the state's backlog
    /// holds for it.
    pub async fn read_delayed_message(
        &self,
        state: &MelState,
        index: u64,
    ) -> DatabaseResult<Option<DelayedInboxMessage>> {
        if index >= state.delayed_messages_seen {
            return Err(DatabaseError::DelayedMessageNotSeen {
                index,
                seen: state.delayed_messages_seen,
            })
        }
        let Some(message) = self.delayed_message(index).await? else { return Ok(None) };

        let backlog = state
            .delayed_backlog()
            .ok_or(DatabaseError::MissingBacklog(state.parent_chain_block_number))?;
        let digest = backlog.get(index)?.digest;
        if message.after_inbox_acc() != digest {
            tracing::error!(target: "mel::db", index, ?digest, "delayed message does not match backlog witness");
            return Err(DatabaseError::DelayedMessageNotInAccumulator(index))
        }
        Ok(Some(message))
    }

    /// Rebuilds the delayed message backlog of `head` and attaches it.
    ///
    /// The window starts at the smaller of the finalized-and-read `watermark` and the head's read
    /// count. The state history is walked back to the last checkpoint at or before that index and
    /// its seen accumulator is replayed forward up to the head, the result must match the head's
    /// seen root.
    #[tracing::instrument(target = "mel::db", skip_all, fields(head = head.parent_chain_block_number))]
    pub async fn initialize_delayed_backlog(
        &self,
        head: &mut MelState,
        watermark: Option<u64>,
        capacity: usize,
        oracle: Option<Arc<dyn FinalizedReadOracle>>,
    ) -> DatabaseResult<()> {
        let target = watermark
            .map_or(head.delayed_messages_read, |w| w.min(head.delayed_messages_read));

        // (block, seen) of every state walked, the block of a message is the first whose seen
        // count covers it.
        let mut seen_by_block = vec![(head.parent_chain_block_number, head.delayed_messages_seen)];
        let mut checkpoint = head.clone();
        checkpoint.take_delayed_backlog();
        while checkpoint.delayed_messages_seen > target && checkpoint.parent_chain_block_number > 0
        {
            let previous = checkpoint.parent_chain_block_number - 1;
            match self.state(previous).await? {
                Some(state) => {
                    seen_by_block.push((previous, state.delayed_messages_seen));
                    checkpoint = state;
                }
                None => {
                    tracing::warn!(target: "mel::db", previous, "state history ends above backlog target");
                    break
                }
            }
        }

        seen_by_block.reverse();
        let mut blocks = seen_by_block.into_iter().peekable();

        let mut acc = checkpoint.delayed_messages_seen_accumulator();
        let mut backlog = DelayedMessageBacklog::new(capacity, oracle);
        for index in checkpoint.delayed_messages_seen..head.delayed_messages_seen {
            while blocks.next_if(|(_, seen)| *seen <= index).is_some() {}
            let block = blocks.peek().map_or(head.parent_chain_block_number, |(block, _)| *block);
            let message = self
                .delayed_message(index)
                .await?
                .ok_or(DatabaseError::MissingDelayedMessage(index))?;
            let digest = message.after_inbox_acc();
            acc.append(digest);
            if index >= target {
                backlog.add(DelayedMessageBacklogEntry {
                    index,
                    digest,
                    parent_chain_block_number: block,
                })?;
            }
        }

        let rebuilt = acc.root();
        if rebuilt != head.delayed_messages_seen_root {
            return Err(DatabaseError::SeenRootMismatch {
                rebuilt,
                head: head.delayed_messages_seen_root,
            })
        }

        backlog.commit_dirties();
        tracing::debug!(
            target: "mel::db",
            checkpoint = checkpoint.parent_chain_block_number,
            first = ?backlog.first_index(),
            len = backlog.len(),
            "initialized delayed message backlog"
        );
        head.set_delayed_backlog(backlog);
        Ok(())
    }

    /// Returns the sequence number of the batch which produced the message at `msg_index`.
    pub async fn find_batch_for_message(&self, msg_index: u64) -> DatabaseResult<Option<u64>> {
        let head = self.head_state().await?;
        let (mut low, mut high) = (0u64, head.batch_count);
        while low < high {
            let mid = low + (high - low) / 2;
            let meta = self
                .batch_metadata(mid)
                .await?
                .ok_or(DatabaseError::MissingBatchMetadata(mid))?;
            if meta.message_count > msg_index {
                high = mid;
            } else {
                low = mid + 1;
            }
        }
        Ok((low < head.batch_count).then_some(low))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{store::MemoryKeyValueStore, test_utils::setup_test_db};
    use alloy_primitives::{Address, Bytes, B256};
    use mel_primitives::{L1IncomingMessage, MessageWithMetadata};

    fn delayed(index: u64, before_inbox_acc: B256) -> DelayedInboxMessage {
        DelayedInboxMessage {
            before_inbox_acc,
            message: L1IncomingMessage {
                l2_msg: Bytes::from(index.to_be_bytes().to_vec()),
                ..Default::default()
            },
        }
    }

    /// Persists a chain of `blocks` states, each seeing `per_block` delayed messages, with the
    /// head having read `read` of them.
    async fn populate<S: KeyValueStore>(
        db: &MelDatabase<S>,
        blocks: u64,
        per_block: u64,
        read: u64,
    ) -> eyre::Result<MelState> {
        let mut state = MelState::genesis(1, 0, B256::ZERO, Address::ZERO, Address::ZERO);
        db.save_state(&state).await?;
        let mut acc = B256::ZERO;
        for block in 1..=blocks {
            let first = state.delayed_messages_seen;
            state.parent_chain_block_number = block;
            let mut messages = Vec::new();
            for i in 0..per_block {
                let message = delayed(first + i, acc);
                acc = message.after_inbox_acc();
                state.accumulate_delayed_message(&message)?;
                messages.push(message);
            }
            state.parent_chain_block_hash = B256::with_last_byte(block as u8);
            state.delayed_messages_read = read.min(state.delayed_messages_seen);
            state.generate_roots();
            db.save_delayed_messages(first, &messages).await?;
            db.save_state(&state).await?;
        }
        Ok(state)
    }

    #[tokio::test]
    async fn test_save_and_load_head_state() -> eyre::Result<()> {
        // Given
        let db = setup_test_db().await;
        assert!(db.fetch_initial_state().await?.is_none());

        // When
        let head = populate(&db, 3, 2, 1).await?;

        // Then
        assert_eq!(db.head_block_number().await?, Some(3));
        assert_eq!(db.head_state().await?, head);
        assert_eq!(db.state(2).await?.map(|s| s.delayed_messages_seen), Some(4));
        assert!(db.state(4).await?.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn test_initialize_backlog_trim_and_reorg() -> eyre::Result<()> {
        // Given
        let db = setup_test_db().await;
        let mut head = populate(&db, 5, 5, 7).await?;

        // When
        db.initialize_delayed_backlog(&mut head, None, 0, None).await?;

        // Then
        let mut backlog =
            head.delayed_backlog().cloned().ok_or_else(|| eyre::eyre!("no backlog"))?;
        assert_eq!(backlog.len(), 18);
        assert_eq!(backlog.first_index(), Some(7));
        assert_eq!(backlog.dirty_len(), 0);
        // five messages per block from block one.
        assert_eq!(backlog.get(7)?.parent_chain_block_number, 2);
        assert_eq!(backlog.get(10)?.parent_chain_block_number, 3);
        assert_eq!(backlog.get(24)?.parent_chain_block_number, 5);

        // When
        backlog.trim_to(13);
        backlog.reorg(21)?;

        // Then
        assert_eq!(backlog.len(), 8);
        assert_eq!(backlog.first_index(), Some(13));
        assert_eq!(backlog.iter().last().map(|e| e.index), Some(20));

        Ok(())
    }

    #[tokio::test]
    async fn test_initialize_backlog_respects_lower_watermark() -> eyre::Result<()> {
        let db = MelDatabase::new(MemoryKeyValueStore::default());
        let mut head = populate(&db, 5, 5, 20).await?;

        db.initialize_delayed_backlog(&mut head, Some(3), 0, None).await?;

        let backlog = head.delayed_backlog().ok_or_else(|| eyre::eyre!("no backlog"))?;
        assert_eq!(backlog.first_index(), Some(3));
        assert_eq!(backlog.len(), 22);
        assert_eq!(backlog.get(3)?.parent_chain_block_number, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_initialize_backlog_detects_corrupted_history() -> eyre::Result<()> {
        // Given
        let db = MelDatabase::new(MemoryKeyValueStore::default());
        let mut head = populate(&db, 2, 3, 0).await?;
        db.save_delayed_messages(4, &[delayed(99, B256::ZERO)]).await?;

        // When
        let res = db.initialize_delayed_backlog(&mut head, None, 0, None).await;

        // Then
        assert!(matches!(res, Err(DatabaseError::SeenRootMismatch { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_read_delayed_message_is_verified() -> eyre::Result<()> {
        // Given
        let db = MelDatabase::new(MemoryKeyValueStore::default());
        let mut head = populate(&db, 2, 3, 1).await?;
        db.initialize_delayed_backlog(&mut head, None, 0, None).await?;

        // When
        let message = db.read_delayed_message(&head, 2).await?;

        // Then
        assert_eq!(message.map(|m| m.message.l2_msg), Some(Bytes::from(2u64.to_be_bytes().to_vec())));
        assert!(matches!(
            db.read_delayed_message(&head, 6).await,
            Err(DatabaseError::DelayedMessageNotSeen { index: 6, seen: 6 })
        ));

        // When
        db.save_delayed_messages(3, &[delayed(42, B256::ZERO)]).await?;

        // Then
        assert!(matches!(
            db.read_delayed_message(&head, 3).await,
            Err(DatabaseError::DelayedMessageNotInAccumulator(3))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_find_batch_for_message() -> eyre::Result<()> {
        // Given
        let db = MelDatabase::new(MemoryKeyValueStore::default());
        let metas: Vec<_> = [1u64, 4, 4, 9]
            .into_iter()
            .map(|message_count| BatchMetadata { message_count, ..Default::default() })
            .collect();
        db.save_batch_metas(0, &metas).await?;
        let mut head = MelState::default();
        head.batch_count = 4;
        head.accumulate_message(&MessageWithMetadata::default());
        db.save_state(&head).await?;

        // Then
        assert_eq!(db.find_batch_for_message(0).await?, Some(0));
        assert_eq!(db.find_batch_for_message(1).await?, Some(1));
        assert_eq!(db.find_batch_for_message(3).await?, Some(1));
        assert_eq!(db.find_batch_for_message(4).await?, Some(3));
        assert_eq!(db.find_batch_for_message(9).await?, None);
        Ok(())
    }
}
