use crate::{ExtractionError, ExtractionResult};
use alloy_consensus::{Transaction, TxEnvelope};
use alloy_primitives::Bytes;
use alloy_rpc_types_eth::Log;
use mel_l1::{abi::calls::AddSequencerBatchCall, EventSchema, InboxEvent};
use mel_primitives::{
    BatchDataLocation, MelState, ParentChainHeader, SequencerInboxBatch, BLOB_HASHES_HEADER_FLAG,
};
use mel_providers::{LogsFetcher, ProviderError, TransactionFetcher};

/// A batch along with the log that delivered it and the transaction that posted it.
#[derive(Debug, Clone)]
pub(crate) struct DeliveredBatch {
    pub(crate) batch: SequencerInboxBatch,
    pub(crate) log: Log,
    pub(crate) tx: TxEnvelope,
}

/// Collects the batches posted by transactions sent to the sequencer inbox in the block, checking
/// that their sequence numbers extend the batch count of the state without gaps.
pub(crate) async fn batches_from_logs<T: TransactionFetcher>(
    state: &MelState,
    header: &ParentChainHeader,
    schema: &EventSchema,
    logs: &[Log],
    transactions: &T,
) -> ExtractionResult<Vec<DeliveredBatch>> {
    let mut batches: Vec<DeliveredBatch> = Vec::new();
    // the transaction of the last batch log, kept only if it was sent to the sequencer inbox.
    let mut posting_tx: Option<(u64, Option<TxEnvelope>)> = None;

    for log in logs {
        let Some(InboxEvent::BatchDelivered(event)) = schema.decode(&log.inner)? else { continue };
        let tx_index =
            log.transaction_index.ok_or(ProviderError::MissingLogMetadata("transaction index"))?;
        if posting_tx.as_ref().map(|(index, _)| *index) != Some(tx_index) {
            let tx = transactions.transaction_by_log(log).await?;
            let to_inbox = tx.to() == Some(state.batch_posting_target_address);
            if !to_inbox {
                tracing::trace!(target: "mel::extraction", tx_hash = ?tx.tx_hash(), to = ?tx.to(), "skipping batch logs of a transaction not sent to the sequencer inbox");
            }
            posting_tx = Some((tx_index, to_inbox.then_some(tx)));
        }
        let Some((_, Some(tx))) = &posting_tx else { continue };

        let sequence_number: u64 = event.batchSequenceNumber.saturating_to();

        // the first batch of a chain may start anywhere.
        let expected = match batches.last() {
            Some(previous) => Some(previous.batch.sequence_number + 1),
            None => (state.msg_count != 0).then_some(state.batch_count),
        };
        if let Some(expected) = expected.filter(|expected| *expected != sequence_number) {
            tracing::error!(target: "mel::extraction", expected, got = sequence_number, "sequencer batches out of order");
            return Err(ExtractionError::BatchesOutOfOrder { expected, got: sequence_number })
        }

        let data_location = BatchDataLocation::try_from(event.dataLocation).map_err(|location| {
            ExtractionError::InvalidDataLocation { sequence_number, location }
        })?;
        let tx_hash = *tx.tx_hash();

        let batch = SequencerInboxBatch::new(
            header.hash(),
            header.number,
            sequence_number,
            event.beforeAcc,
            event.afterAcc,
            event.delayedAcc,
            event.afterDelayedMessagesRead.saturating_to(),
            event.timeBounds.into(),
            tx_hash,
            tx_index,
            data_location,
        );
        tracing::trace!(target: "mel::extraction", sequence_number, %data_location, ?tx_hash, "found sequencer batch");
        batches.push(DeliveredBatch { batch, log: log.clone(), tx: tx.clone() });
    }

    Ok(batches)
}

/// Resolves the payload of the batch according to its data location and returns the serialized
/// batch. The result is cached on the batch.
pub(crate) async fn serialize_batch<L: LogsFetcher>(
    delivered: &mut DeliveredBatch,
    schema: &EventSchema,
    logs: &L,
) -> ExtractionResult<Bytes> {
    if let Some(serialized) = delivered.batch.serialized() {
        return Ok(serialized.clone())
    }

    let batch = &delivered.batch;
    let payload = match batch.data_location {
        BatchDataLocation::TxInput => {
            AddSequencerBatchCall::try_decode(delivered.tx.input())
                .ok_or(ExtractionError::InvalidBatchCalldata(batch.tx_hash))?
                .into_data()
        }
        BatchDataLocation::SeparateBatchEvent => {
            let tx_logs = logs.logs_for_tx_index(batch.block_hash, batch.tx_index).await?;
            let mut data = None;
            for log in tx_logs.iter().filter(|log| log.inner.address == delivered.log.inner.address)
            {
                if let Some(InboxEvent::BatchData(event)) = schema.decode(&log.inner)? {
                    if event.batchSequenceNumber.saturating_to::<u64>() == batch.sequence_number {
                        data = Some(event.data);
                        break
                    }
                }
            }
            data.ok_or(ExtractionError::MissingBatchData(batch.sequence_number))?
        }
        BatchDataLocation::NoData => Bytes::new(),
        BatchDataLocation::Blob => {
            let hashes = delivered
                .tx
                .blob_versioned_hashes()
                .filter(|hashes| !hashes.is_empty())
                .ok_or(ExtractionError::MissingBlobHashes(batch.tx_hash))?;
            let mut payload = Vec::with_capacity(1 + hashes.len() * 32);
            payload.push(BLOB_HASHES_HEADER_FLAG);
            for hash in hashes {
                payload.extend_from_slice(hash.as_slice());
            }
            payload.into()
        }
    };

    Ok(delivered.batch.set_payload(&payload).clone())
}
