use alloy_primitives::{keccak256, Bytes, B256};
use alloy_rlp::{RlpDecodable, RlpEncodable};
use std::vec::Vec;

/// The header byte prefixing a serialized batch payload made of blob versioned hashes.
pub const BLOB_HASHES_HEADER_FLAG: u8 = 0x50;

/// The size of the fixed header of a serialized batch.
pub const SERIALIZED_BATCH_HEADER_LEN: usize = 40;

/// Where the data of a sequencer batch is located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
#[cfg_attr(any(test, feature = "arbitrary"), derive(arbitrary::Arbitrary))]
#[repr(u8)]
pub enum BatchDataLocation {
    /// The calldata of the posting transaction.
    #[display("TxInput")]
    TxInput = 0,
    /// A separate `SequencerBatchData` event in the same transaction.
    #[display("SeparateBatchEvent")]
    SeparateBatchEvent = 1,
    /// The batch carries no data.
    #[display("NoData")]
    NoData = 2,
    /// EIP-4844 blobs attached to the posting transaction.
    #[display("Blob")]
    Blob = 3,
}

impl TryFrom<u8> for BatchDataLocation {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::TxInput,
            1 => Self::SeparateBatchEvent,
            2 => Self::NoData,
            3 => Self::Blob,
            other => return Err(other),
        })
    }
}

/// The bounds the sequencer committed to for a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(any(test, feature = "arbitrary"), derive(arbitrary::Arbitrary))]
pub struct TimeBounds {
    /// Minimum timestamp of the batch messages.
    pub min_timestamp: u64,
    /// Maximum timestamp of the batch messages.
    pub max_timestamp: u64,
    /// Minimum block number of the batch messages.
    pub min_block_number: u64,
    /// Maximum block number of the batch messages.
    pub max_block_number: u64,
}

/// A batch delivered to the sequencer inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencerInboxBatch {
    /// The hash of the parent chain block holding the batch.
    pub block_hash: B256,
    /// The number of the parent chain block holding the batch.
    pub parent_chain_block_number: u64,
    /// The sequence number of the batch.
    pub sequence_number: u64,
    /// The inbox accumulator before the batch.
    pub before_inbox_acc: B256,
    /// The inbox accumulator after the batch.
    pub after_inbox_acc: B256,
    /// The delayed accumulator at the time of posting.
    pub after_delayed_acc: B256,
    /// The delayed message count read after the batch.
    pub after_delayed_count: u64,
    /// The time bounds committed for the batch.
    pub time_bounds: TimeBounds,
    /// The hash of the posting transaction.
    pub tx_hash: B256,
    /// The index of the posting transaction within its block.
    pub tx_index: u64,
    /// Where the batch data lives.
    pub data_location: BatchDataLocation,
    /// The serialized form, populated once resolved.
    serialized: Option<Bytes>,
}

impl SequencerInboxBatch {
    /// Returns a new batch without its serialized form.
    #[allow(clippy::too_many_arguments)]
    pub const fn new(
        block_hash: B256,
        parent_chain_block_number: u64,
        sequence_number: u64,
        before_inbox_acc: B256,
        after_inbox_acc: B256,
        after_delayed_acc: B256,
        after_delayed_count: u64,
        time_bounds: TimeBounds,
        tx_hash: B256,
        tx_index: u64,
        data_location: BatchDataLocation,
    ) -> Self {
        Self {
            block_hash,
            parent_chain_block_number,
            sequence_number,
            before_inbox_acc,
            after_inbox_acc,
            after_delayed_acc,
            after_delayed_count,
            time_bounds,
            tx_hash,
            tx_index,
            data_location,
            serialized: None,
        }
    }

    /// Returns the cached serialized form, if already resolved.
    pub const fn serialized(&self) -> Option<&Bytes> {
        self.serialized.as_ref()
    }

    /// Serializes the batch from its resolved payload and caches the result.
    pub fn set_payload(&mut self, payload: &[u8]) -> &Bytes {
        let bounds = &self.time_bounds;
        let mut out = Vec::with_capacity(SERIALIZED_BATCH_HEADER_LEN + payload.len());
        for field in [
            bounds.min_timestamp,
            bounds.max_timestamp,
            bounds.min_block_number,
            bounds.max_block_number,
            self.after_delayed_count,
        ] {
            out.extend_from_slice(&field.to_be_bytes());
        }
        out.extend_from_slice(payload);
        self.serialized.insert(out.into())
    }
}

/// The per batch record used to map message counts back to batches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
#[cfg_attr(any(test, feature = "arbitrary"), derive(arbitrary::Arbitrary))]
pub struct BatchMetadata {
    /// The inbox accumulator after the batch.
    pub accumulator: B256,
    /// The message count after the batch.
    pub message_count: u64,
    /// The delayed message count after the batch.
    pub delayed_message_count: u64,
    /// The parent chain block holding the batch.
    pub parent_chain_block: u64,
}

/// Returns the legacy gas cost of posting `data`.
pub fn legacy_batch_gas_cost(data: &[u8]) -> u64 {
    let zeros = data.iter().filter(|b| **b == 0).count() as u64;
    let non_zeros = data.len() as u64 - zeros;
    let words = (data.len() as u64).div_ceil(32);
    // calldata cost, keccak cost and two storage writes.
    4 * zeros + 16 * non_zeros + 30 + 6 * words + 2 * 20_000
}

/// Returns the keccak hash of a serialized batch.
pub fn batch_data_hash(serialized: &[u8]) -> B256 {
    keccak256(serialized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(location: BatchDataLocation) -> SequencerInboxBatch {
        SequencerInboxBatch::new(
            B256::ZERO,
            1,
            0,
            B256::ZERO,
            B256::ZERO,
            B256::ZERO,
            9,
            TimeBounds {
                min_timestamp: 1,
                max_timestamp: 2,
                min_block_number: 3,
                max_block_number: 4,
            },
            B256::ZERO,
            0,
            location,
        )
    }

    #[test]
    fn test_serialized_batch_header() {
        // Given
        let mut batch = batch(BatchDataLocation::NoData);

        // When
        let serialized = batch.set_payload(&[0xde, 0xad]).clone();

        // Then
        assert_eq!(serialized.len(), SERIALIZED_BATCH_HEADER_LEN + 2);
        assert_eq!(&serialized[..8], &1u64.to_be_bytes());
        assert_eq!(&serialized[24..32], &4u64.to_be_bytes());
        assert_eq!(&serialized[32..40], &9u64.to_be_bytes());
        assert_eq!(&serialized[40..], &[0xde, 0xad]);
        assert_eq!(batch.serialized(), Some(&serialized));
    }

    #[test]
    fn test_data_location_from_u8() {
        assert_eq!(BatchDataLocation::try_from(3), Ok(BatchDataLocation::Blob));
        assert_eq!(BatchDataLocation::try_from(4), Err(4));
    }

    #[test]
    fn test_legacy_batch_gas_cost() {
        assert_eq!(legacy_batch_gas_cost(&[]), 40_030);
        // 1 zero, 32 non zero bytes over 2 words.
        let mut data = vec![0u8];
        data.extend_from_slice(&[1u8; 32]);
        assert_eq!(legacy_batch_gas_cost(&data), 4 + 16 * 32 + 30 + 12 + 40_000);
    }
}
