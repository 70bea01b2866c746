use crate::{ExtractionError, ExtractionResult};
use alloy_consensus::Transaction;
use alloy_primitives::{keccak256, Bytes, B256};
use alloy_rpc_types_eth::Log;
use mel_l1::{abi::calls::try_decode_l2_message_from_origin, EventSchema, InboxEvent};
use mel_primitives::{
    DelayedInboxMessage, L1IncomingMessage, L1IncomingMessageHeader, MelState, ParentChainHeader,
};
use mel_providers::{DelayedMessageDatabase, ProviderResult, TransactionFetcher};
use std::collections::{HashMap, HashSet};

/// A delayed message announced by the bridge, waiting for its payload.
#[derive(Debug)]
struct Scaffold {
    index: u64,
    data_hash: B256,
    message: DelayedInboxMessage,
}

/// Collects the delayed messages delivered to the bridge in the block.
///
/// The bridge announces every message with a `MessageDelivered` event, while its payload is
/// emitted by the inbox that received it, either inline or in the call data of the originating
/// transaction. The returned messages are sorted by request id and must extend the seen count of
/// the state.
pub(crate) async fn delayed_messages_from_logs<T: TransactionFetcher>(
    state: &MelState,
    header: &ParentChainHeader,
    schema: &EventSchema,
    logs: &[Log],
    transactions: &T,
) -> ExtractionResult<Vec<DelayedInboxMessage>> {
    let mut scaffolds = Vec::new();
    let mut inboxes = HashSet::new();
    for log in logs
        .iter()
        .filter(|log| log.inner.address == state.delayed_message_posting_target_address)
    {
        let Some(InboxEvent::MessageDelivered(event)) = schema.decode(&log.inner)? else {
            continue
        };
        inboxes.insert(event.inbox);
        scaffolds.push(Scaffold {
            index: event.messageIndex.saturating_to(),
            data_hash: event.messageDataHash,
            message: DelayedInboxMessage {
                before_inbox_acc: event.beforeInboxAcc,
                message: L1IncomingMessage {
                    header: L1IncomingMessageHeader {
                        kind: event.kind,
                        poster: event.sender,
                        block_number: header.number,
                        timestamp: event.timestamp,
                        request_id: Some(B256::from(event.messageIndex)),
                        l1_base_fee: event.baseFeeL1,
                    },
                    l2_msg: Bytes::new(),
                    batch_gas_cost: None,
                },
            },
        });
    }
    if scaffolds.is_empty() {
        return Ok(Vec::new())
    }

    let wanted: HashSet<u64> = scaffolds.iter().map(|scaffold| scaffold.index).collect();
    let mut payloads: HashMap<u64, Bytes> = HashMap::with_capacity(wanted.len());
    for log in logs.iter().filter(|log| inboxes.contains(&log.inner.address)) {
        match schema.decode(&log.inner)? {
            Some(InboxEvent::InboxMessageDelivered(event)) => {
                let index = event.messageNum.saturating_to();
                if wanted.contains(&index) {
                    payloads.insert(index, event.data);
                }
            }
            Some(InboxEvent::InboxMessageDeliveredFromOrigin(event)) => {
                let index = event.messageNum.saturating_to();
                if wanted.contains(&index) {
                    let tx = transactions.transaction_by_log(log).await?;
                    let payload = try_decode_l2_message_from_origin(tx.input())
                        .ok_or(ExtractionError::InvalidOriginCalldata(*tx.tx_hash()))?;
                    payloads.insert(index, payload);
                }
            }
            _ => {}
        }
    }

    let mut messages = Vec::with_capacity(scaffolds.len());
    for Scaffold { index, data_hash, mut message } in scaffolds {
        let payload =
            payloads.get(&index).cloned().ok_or(ExtractionError::MissingDelayedMessageData(index))?;
        let got = keccak256(&payload);
        if got != data_hash {
            tracing::error!(target: "mel::extraction", index, expected = ?data_hash, ?got, "delayed message payload hash mismatch");
            return Err(ExtractionError::DelayedMessageHashMismatch {
                index,
                expected: data_hash,
                got,
            })
        }
        message.message.l2_msg = payload;
        messages.push((index, message));
    }

    messages.sort_by_key(|(_, message)| message.message.header.request_id);
    for (expected, (index, _)) in (state.delayed_messages_seen..).zip(&messages) {
        if *index != expected {
            return Err(ExtractionError::DelayedMessagesOutOfOrder { expected, got: *index })
        }
    }

    Ok(messages.into_iter().map(|(_, message)| message).collect())
}

/// Serves the delayed messages found in the block being extracted on top of a delayed message
/// database holding every message seen before it.
#[derive(Debug)]
pub(crate) struct PendingDelayedMessages<'a, D> {
    inner: &'a D,
    first_index: u64,
    messages: &'a [DelayedInboxMessage],
}

impl<'a, D> PendingDelayedMessages<'a, D> {
    pub(crate) const fn new(
        inner: &'a D,
        first_index: u64,
        messages: &'a [DelayedInboxMessage],
    ) -> Self {
        Self { inner, first_index, messages }
    }
}

#[async_trait::async_trait]
impl<'a, D: DelayedMessageDatabase> DelayedMessageDatabase for PendingDelayedMessages<'a, D> {
    async fn read_delayed_message(
        &self,
        state: &MelState,
        index: u64,
    ) -> ProviderResult<Option<DelayedInboxMessage>> {
        if index >= self.first_index {
            let offset = (index - self.first_index) as usize;
            return Ok(self.messages.get(offset).cloned())
        }
        self.inner.read_delayed_message(state, index).await
    }
}
