//! The message extraction function.
//!
//! [`extract_messages`] reads a parent chain block on top of a [`MelState`] and returns the next
//! state along with the messages and delayed messages found in the block. It holds no state of its
//! own, so the same inputs always produce the same output whether the data sources are live or
//! resolved from preimages.

mod batch;
use batch::{batches_from_logs, serialize_batch};

mod delayed;
use delayed::{delayed_messages_from_logs, PendingDelayedMessages};

mod error;
pub use error::{ExtractionError, ExtractionResult};

mod parse;
use parse::sequencer_message;

mod report;
use report::{batch_posting_reports, verify_batch_data_hash};

mod segments;
pub use segments::messages_from_segments;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use mel_l1::EventSchema;
use mel_primitives::{
    legacy_batch_gas_cost, BatchMetadata, DelayedInboxMessage, MelState, MessageWithMetadata,
    ParentChainHeader,
};
use mel_providers::{BlobProvider, DelayedMessageDatabase, LogsFetcher, TransactionFetcher};

/// The data sources read by [`extract_messages`].
#[derive(Debug)]
pub struct DataSources<'a, L, T, D, B> {
    /// The inbox event schema.
    pub schema: &'a EventSchema,
    /// The logs of parent chain blocks.
    pub logs: &'a L,
    /// The transactions referenced by logs.
    pub transactions: &'a T,
    /// The delayed messages seen before the block.
    pub delayed_messages: &'a D,
    /// The blobs of blob batches.
    pub blobs: &'a B,
}

/// The result of extracting a parent chain block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionOutput {
    /// The state after the block.
    pub state: MelState,
    /// The messages extracted from the batches of the block.
    pub messages: Vec<MessageWithMetadata>,
    /// The delayed messages delivered in the block.
    pub delayed_messages: Vec<DelayedInboxMessage>,
    /// The metadata of the batches of the block.
    pub batch_metas: Vec<BatchMetadata>,
}

impl ExtractionOutput {
    /// Returns the index of the first extracted message.
    pub fn first_message_index(&self) -> u64 {
        self.state.msg_count - self.messages.len() as u64
    }

    /// Returns the index of the first delayed message delivered in the block.
    pub fn first_delayed_message_index(&self) -> u64 {
        self.state.delayed_messages_seen - self.delayed_messages.len() as u64
    }

    /// Returns the sequence number of the first batch of the block.
    pub fn first_batch_sequence_number(&self) -> u64 {
        self.state.batch_count - self.batch_metas.len() as u64
    }
}

/// Extracts the messages of the parent chain block on top of `state`.
///
/// A block that does not build on the block of `state` fails with
/// [`ExtractionError::ParentHashMismatch`]. Delayed messages delivered in the block are folded into
/// the next state, and appended to its copy of the backlog as dirty entries, before the batches
/// are expanded so that batches can read them. `state` is left untouched.
#[tracing::instrument(target = "mel::extraction", skip_all, fields(block = header.number))]
pub async fn extract_messages<L, T, D, B>(
    state: &MelState,
    header: &ParentChainHeader,
    sources: &DataSources<'_, L, T, D, B>,
) -> ExtractionResult<ExtractionOutput>
where
    L: LogsFetcher,
    T: TransactionFetcher,
    D: DelayedMessageDatabase,
    B: BlobProvider,
{
    if header.parent_hash != state.parent_chain_block_hash {
        return Err(ExtractionError::ParentHashMismatch {
            expected: state.parent_chain_block_hash,
            got: header.parent_hash,
        })
    }

    let mut next = state.clone();
    next.parent_chain_block_number = header.number;
    next.parent_chain_block_hash = header.hash();
    next.parent_chain_previous_block_hash = header.parent_hash;

    let logs = sources.logs.logs_for_block_hash(header.hash()).await?;
    let mut batches =
        batches_from_logs(state, header, sources.schema, &logs, sources.transactions).await?;
    let delayed_messages =
        delayed_messages_from_logs(state, header, sources.schema, &logs, sources.transactions)
            .await?;

    for delayed in &delayed_messages {
        next.accumulate_delayed_message(delayed)?;
    }

    let reports = batch_posting_reports(&delayed_messages, batches.len())?;
    let delayed_reader = PendingDelayedMessages::new(
        sources.delayed_messages,
        state.delayed_messages_seen,
        &delayed_messages,
    );

    let mut messages = Vec::new();
    let mut batch_metas = Vec::with_capacity(batches.len());
    for (delivered, report) in batches.iter_mut().zip(&reports) {
        let serialized = serialize_batch(delivered, sources.schema, sources.logs).await?;
        let batch = &delivered.batch;
        verify_batch_data_hash(report, batch.sequence_number, &serialized)?;
        let gas_cost = legacy_batch_gas_cost(&serialized);

        let sequencer_message = sequencer_message(&serialized, header, sources.blobs).await?;
        let mut delayed_messages_read = next.delayed_messages_read;
        let batch_messages = messages_from_segments(
            &sequencer_message,
            state,
            &mut delayed_messages_read,
            &delayed_reader,
        )
        .await?;
        next.delayed_messages_read = delayed_messages_read;

        for mut message in batch_messages {
            message.message.batch_gas_cost = Some(gas_cost);
            next.accumulate_message(&message);
            messages.push(message);
        }
        next.batch_count = batch.sequence_number + 1;
        batch_metas.push(BatchMetadata {
            accumulator: batch.after_inbox_acc,
            message_count: next.msg_count,
            delayed_message_count: batch.after_delayed_count,
            parent_chain_block: header.number,
        });
        tracing::trace!(target: "mel::extraction", sequence_number = batch.sequence_number, gas_cost, msg_count = next.msg_count, "expanded sequencer batch");
    }

    next.generate_roots();
    tracing::debug!(
        target: "mel::extraction",
        messages = messages.len(),
        delayed_messages = delayed_messages.len(),
        batches = batch_metas.len(),
        "extracted parent chain block"
    );

    Ok(ExtractionOutput { state: next, messages, delayed_messages, batch_metas })
}
