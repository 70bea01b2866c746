use crate::{
    accumulator::MerkleAccumulator,
    backlog::{BacklogResult, DelayedMessageBacklog, DelayedMessageBacklogEntry},
    DelayedInboxMessage, MessageWithMetadata,
};
use alloy_primitives::{keccak256, Address, B256};
use alloy_rlp::{BufMut, Decodable, Encodable, Header};
use std::vec::Vec;

/// The current version of the [`MelState`] encoding.
pub const MEL_STATE_VERSION: u16 = 0;

/// The extraction state after processing a parent chain block.
///
/// The delayed message backlog is not part of the encoding. Cloning a state copies its backlog, so
/// a clone can be extended without touching the original.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MelState {
    /// The encoding version.
    pub version: u16,
    /// The parent chain id.
    pub parent_chain_id: u64,
    /// The last processed parent chain block number.
    pub parent_chain_block_number: u64,
    /// The last processed parent chain block hash.
    pub parent_chain_block_hash: B256,
    /// The parent hash of the last processed parent chain block.
    pub parent_chain_previous_block_hash: B256,
    /// The sequencer inbox address.
    pub batch_posting_target_address: Address,
    /// The delayed bridge address.
    pub delayed_message_posting_target_address: Address,
    /// The number of extracted messages.
    pub msg_count: u64,
    /// The number of extracted batches.
    pub batch_count: u64,
    /// The number of delayed messages read into the message stream.
    pub delayed_messages_read: u64,
    /// The number of delayed messages seen on the parent chain.
    pub delayed_messages_seen: u64,
    /// The root of the message accumulator.
    pub message_accumulator_root: B256,
    /// The root of the seen delayed message accumulator.
    pub delayed_messages_seen_root: B256,
    message_partials: Vec<B256>,
    delayed_messages_seen_partials: Vec<B256>,
    delayed_backlog: Option<DelayedMessageBacklog>,
}

impl MelState {
    /// Returns the genesis state anchored at the provided parent chain block.
    pub fn genesis(
        parent_chain_id: u64,
        parent_chain_block_number: u64,
        parent_chain_block_hash: B256,
        batch_posting_target_address: Address,
        delayed_message_posting_target_address: Address,
    ) -> Self {
        Self {
            version: MEL_STATE_VERSION,
            parent_chain_id,
            parent_chain_block_number,
            parent_chain_block_hash,
            batch_posting_target_address,
            delayed_message_posting_target_address,
            ..Default::default()
        }
    }

    /// Returns the commitment to the state, `keccak(rlp(state))`.
    pub fn hash(&self) -> B256 {
        keccak256(alloy_rlp::encode(self))
    }

    /// Returns the message accumulator.
    pub fn message_accumulator(&self) -> MerkleAccumulator {
        MerkleAccumulator::from_partials(self.msg_count, self.message_partials.clone())
    }

    /// Returns the seen delayed message accumulator.
    pub fn delayed_messages_seen_accumulator(&self) -> MerkleAccumulator {
        MerkleAccumulator::from_partials(
            self.delayed_messages_seen,
            self.delayed_messages_seen_partials.clone(),
        )
    }

    /// Returns the delayed message backlog, if attached.
    pub const fn delayed_backlog(&self) -> Option<&DelayedMessageBacklog> {
        self.delayed_backlog.as_ref()
    }

    /// Returns a mutable reference to the delayed message backlog, if attached.
    pub fn delayed_backlog_mut(&mut self) -> Option<&mut DelayedMessageBacklog> {
        self.delayed_backlog.as_mut()
    }

    /// Attaches a delayed message backlog to the state.
    pub fn set_delayed_backlog(&mut self, backlog: DelayedMessageBacklog) {
        self.delayed_backlog = Some(backlog);
    }

    /// Detaches and returns the delayed message backlog.
    pub fn take_delayed_backlog(&mut self) -> Option<DelayedMessageBacklog> {
        self.delayed_backlog.take()
    }

    /// Folds a message into the message accumulator and increments the message count.
    pub fn accumulate_message(&mut self, message: &MessageWithMetadata) {
        let mut acc = self.message_accumulator();
        acc.append(message.hash());
        self.message_partials = acc.partials().to_vec();
        self.msg_count += 1;
    }

    /// Folds a delayed message into the seen accumulator, increments the seen count and appends
    /// its witness to the backlog when one is attached. The witness records the parent chain block
    /// of the state.
    pub fn accumulate_delayed_message(&mut self, message: &DelayedInboxMessage) -> BacklogResult<()> {
        let digest = message.after_inbox_acc();
        if let Some(backlog) = &mut self.delayed_backlog {
            backlog.add(DelayedMessageBacklogEntry {
                index: self.delayed_messages_seen,
                digest,
                parent_chain_block_number: self.parent_chain_block_number,
            })?;
        }
        let mut acc = self.delayed_messages_seen_accumulator();
        acc.append(digest);
        self.delayed_messages_seen_partials = acc.partials().to_vec();
        self.delayed_messages_seen += 1;
        Ok(())
    }

    /// Recomputes both accumulator roots from their partials.
    pub fn generate_roots(&mut self) {
        self.message_accumulator_root = self.message_accumulator().root();
        self.delayed_messages_seen_root = self.delayed_messages_seen_accumulator().root();
    }

    fn payload_length(&self) -> usize {
        self.version.length() +
            self.parent_chain_id.length() +
            self.parent_chain_block_number.length() +
            self.parent_chain_block_hash.length() +
            self.parent_chain_previous_block_hash.length() +
            self.batch_posting_target_address.length() +
            self.delayed_message_posting_target_address.length() +
            self.msg_count.length() +
            self.batch_count.length() +
            self.delayed_messages_read.length() +
            self.delayed_messages_seen.length() +
            self.message_accumulator_root.length() +
            self.delayed_messages_seen_root.length() +
            self.message_partials.length() +
            self.delayed_messages_seen_partials.length()
    }
}

impl Encodable for MelState {
    fn encode(&self, out: &mut dyn BufMut) {
        Header { list: true, payload_length: self.payload_length() }.encode(out);
        self.version.encode(out);
        self.parent_chain_id.encode(out);
        self.parent_chain_block_number.encode(out);
        self.parent_chain_block_hash.encode(out);
        self.parent_chain_previous_block_hash.encode(out);
        self.batch_posting_target_address.encode(out);
        self.delayed_message_posting_target_address.encode(out);
        self.msg_count.encode(out);
        self.batch_count.encode(out);
        self.delayed_messages_read.encode(out);
        self.delayed_messages_seen.encode(out);
        self.message_accumulator_root.encode(out);
        self.delayed_messages_seen_root.encode(out);
        self.message_partials.encode(out);
        self.delayed_messages_seen_partials.encode(out);
    }

    fn length(&self) -> usize {
        let payload_length = self.payload_length();
        payload_length + alloy_rlp::length_of_length(payload_length)
    }
}

impl Decodable for MelState {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let header = Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString)
        }
        let started_len = buf.len();

        let this = Self {
            version: Decodable::decode(buf)?,
            parent_chain_id: Decodable::decode(buf)?,
            parent_chain_block_number: Decodable::decode(buf)?,
            parent_chain_block_hash: Decodable::decode(buf)?,
            parent_chain_previous_block_hash: Decodable::decode(buf)?,
            batch_posting_target_address: Decodable::decode(buf)?,
            delayed_message_posting_target_address: Decodable::decode(buf)?,
            msg_count: Decodable::decode(buf)?,
            batch_count: Decodable::decode(buf)?,
            delayed_messages_read: Decodable::decode(buf)?,
            delayed_messages_seen: Decodable::decode(buf)?,
            message_accumulator_root: Decodable::decode(buf)?,
            delayed_messages_seen_root: Decodable::decode(buf)?,
            message_partials: Decodable::decode(buf)?,
            delayed_messages_seen_partials: Decodable::decode(buf)?,
            delayed_backlog: None,
        };

        let consumed = started_len - buf.len();
        if consumed != header.payload_length {
            return Err(alloy_rlp::Error::ListLengthMismatch {
                expected: header.payload_length,
                got: consumed,
            })
        }
        if this.version > MEL_STATE_VERSION {
            return Err(alloy_rlp::Error::Custom("unsupported mel state version"))
        }
        Ok(this)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{accumulator::merkle_tree_preimages, L1IncomingMessage};
    use alloy_primitives::Bytes;

    fn delayed(i: u64) -> DelayedInboxMessage {
        DelayedInboxMessage {
            before_inbox_acc: B256::with_last_byte(i as u8),
            message: L1IncomingMessage {
                l2_msg: Bytes::from(i.to_be_bytes().to_vec()),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_state_rlp_roundtrip_drops_backlog() -> eyre::Result<()> {
        // Given
        let mut state = MelState::genesis(1, 10, B256::repeat_byte(1), Address::ZERO, Address::ZERO);
        state.set_delayed_backlog(DelayedMessageBacklog::new(0, None));
        for i in 0..3 {
            state.accumulate_delayed_message(&delayed(i))?;
        }
        state.accumulate_message(&MessageWithMetadata::default());
        state.generate_roots();

        // When
        let encoded = alloy_rlp::encode(&state);
        let decoded = MelState::decode(&mut encoded.as_slice())?;

        // Then
        assert!(decoded.delayed_backlog().is_none());
        let mut expected = state.clone();
        expected.delayed_backlog = None;
        assert_eq!(decoded, expected);
        assert_eq!(decoded.hash(), state.hash());
        Ok(())
    }

    #[test]
    fn test_accumulate_delayed_message_feeds_backlog() -> eyre::Result<()> {
        // Given
        let mut state = MelState::default();
        state.set_delayed_backlog(DelayedMessageBacklog::new(0, None));
        let messages: Vec<_> = (0..5).map(delayed).collect();

        // When
        for message in &messages {
            state.accumulate_delayed_message(message)?;
        }
        state.generate_roots();

        // Then
        let items: Vec<_> = messages.iter().map(DelayedInboxMessage::after_inbox_acc).collect();
        assert_eq!(state.delayed_messages_seen, 5);
        assert_eq!(state.delayed_messages_seen_root, merkle_tree_preimages(&items).0);
        let backlog = state.delayed_backlog().ok_or_else(|| eyre::eyre!("no backlog"))?;
        assert_eq!(backlog.len(), 5);
        assert_eq!(backlog.dirty_len(), 5);
        assert_eq!(backlog.get(3)?.digest, items[3]);
        Ok(())
    }

    #[test]
    fn test_clone_copies_backlog() -> eyre::Result<()> {
        let mut state = MelState::default();
        state.set_delayed_backlog(DelayedMessageBacklog::new(0, None));
        let mut clone = state.clone();
        clone.accumulate_delayed_message(&delayed(0))?;
        assert_eq!(state.delayed_backlog().map(DelayedMessageBacklog::len), Some(0));
        assert_eq!(clone.delayed_backlog().map(DelayedMessageBacklog::dirty_len), Some(1));
        assert_eq!(state.delayed_messages_seen, 0);

        // the original extends from the same point.
        state.accumulate_delayed_message(&delayed(0))?;
        assert_eq!(state.delayed_backlog(), clone.delayed_backlog());
        Ok(())
    }
}
