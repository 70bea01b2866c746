//! Test utilities for the providers.

use crate::{
    block_logs,
    replay::{record_block_preimages, trie_preimages, Preimages},
    ParentChainClient, ProviderResult,
};
use alloy_consensus::{
    Eip658Value, Receipt, ReceiptEnvelope, ReceiptWithBloom, Sealable, SignableTransaction,
    TxEnvelope, TxLegacy,
};
use alloy_eips::eip2718::Encodable2718;
use alloy_eips::BlockNumberOrTag;
use alloy_primitives::{Address, Bloom, Bytes, Signature, TxKind, B256, U256};
use alloy_rpc_types_eth::{Filter, Log};
use alloy_sol_types::SolEvent;
use mel_l1::{abi::logs::InboxMessageDelivered, EventSchema, InboxEventKind};
use mel_primitives::ParentChainHeader;
use parking_lot::RwLock;
use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

/// Returns a signed legacy transaction calling `to` with `input`.
pub fn transaction(nonce: u64, to: Address, input: Bytes) -> TxEnvelope {
    let tx = TxLegacy {
        nonce,
        to: TxKind::Call(to),
        input,
        gas_limit: 1_000_000,
        gas_price: 1,
        ..Default::default()
    };
    tx.into_signed(Signature::new(U256::from(1), U256::from(1), false)).into()
}

/// Returns an `InboxMessageDelivered` log emitted by `address`.
pub fn inbox_log(schema: &EventSchema, address: Address, message_num: u64) -> alloy_primitives::Log {
    let event = InboxMessageDelivered { messageNum: U256::from(message_num), data: Bytes::new() };
    debug_assert_eq!(
        schema.topic(InboxEventKind::InboxMessageDelivered),
        InboxMessageDelivered::SIGNATURE_HASH
    );
    alloy_primitives::Log { address, data: event.encode_log_data() }
}

/// Returns a successful receipt carrying `logs`.
pub fn receipt(logs: Vec<alloy_primitives::Log>) -> ReceiptEnvelope {
    ReceiptEnvelope::Legacy(ReceiptWithBloom {
        receipt: Receipt { status: Eip658Value::Eip658(true), cumulative_gas_used: 21_000, logs },
        logs_bloom: Bloom::default(),
    })
}

/// Returns a header at `number` committing to the provided transactions and their receipts,
/// along with the preimages needed to replay the block.
pub fn replayable_block(
    number: u64,
    parent_hash: B256,
    transactions: &[(TxEnvelope, Vec<alloy_primitives::Log>)],
) -> (ParentChainHeader, Preimages) {
    let txs: Vec<_> = transactions.iter().map(|(tx, _)| tx.clone()).collect();
    let receipts: Vec<_> = transactions.iter().map(|(_, logs)| receipt(logs.clone())).collect();

    let encoded_txs: Vec<_> = txs.iter().map(Encodable2718::encoded_2718).collect();
    let encoded_receipts: Vec<_> = receipts.iter().map(Encodable2718::encoded_2718).collect();
    let mut header = mel_primitives::test_utils::header(number, parent_hash, 0).into_inner();
    header.transactions_root = trie_preimages(&encoded_txs).0;
    header.receipts_root = trie_preimages(&encoded_receipts).0;
    let header = header.seal_slow();

    let preimages = record_block_preimages(&header, &txs, &receipts);
    (header, preimages)
}

#[derive(Debug, Default)]
struct MockChain {
    headers: BTreeMap<u64, ParentChainHeader>,
    logs: HashMap<B256, Vec<Log>>,
    transactions: HashMap<B256, TxEnvelope>,
    safe: Option<u64>,
    finalized: Option<u64>,
}

/// An in memory parent chain.
#[derive(Debug, Default, Clone)]
pub struct MockParentChain {
    chain: Arc<RwLock<MockChain>>,
    log_queries: Arc<AtomicUsize>,
}

impl MockParentChain {
    /// Appends a block made of the provided transactions and the logs they emit, replacing any
    /// block at the same height.
    pub fn push_block(
        &self,
        header: ParentChainHeader,
        transactions: Vec<(TxEnvelope, Vec<alloy_primitives::Log>)>,
    ) {
        let hash = header.hash();
        let logs = block_logs(
            hash,
            header.number,
            transactions.iter().map(|(tx, logs)| (*tx.tx_hash(), logs.as_slice())),
        );
        let mut chain = self.chain.write();
        for (tx, _) in transactions {
            chain.transactions.insert(*tx.tx_hash(), tx);
        }
        chain.logs.insert(hash, logs);
        chain.headers.insert(header.number, header);
    }

    /// Removes every block at or above `number`.
    pub fn truncate(&self, number: u64) {
        let mut chain = self.chain.write();
        let removed = chain.headers.split_off(&number);
        for header in removed.values() {
            chain.logs.remove(&header.hash());
        }
    }

    /// Sets the safe block number.
    pub fn set_safe(&self, number: u64) {
        self.chain.write().safe = Some(number);
    }

    /// Sets the finalized block number.
    pub fn set_finalized(&self, number: u64) {
        self.chain.write().finalized = Some(number);
    }

    /// Returns the number of log queries served.
    pub fn log_queries(&self) -> usize {
        self.log_queries.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl ParentChainClient for MockParentChain {
    async fn header_by_number(
        &self,
        number: BlockNumberOrTag,
    ) -> ProviderResult<Option<ParentChainHeader>> {
        let chain = self.chain.read();
        let number = match number {
            BlockNumberOrTag::Number(number) => Some(number),
            BlockNumberOrTag::Latest => chain.headers.keys().last().copied(),
            BlockNumberOrTag::Safe => chain.safe,
            BlockNumberOrTag::Finalized => chain.finalized,
            _ => None,
        };
        Ok(number.and_then(|number| chain.headers.get(&number).cloned()))
    }

    async fn logs(&self, filter: &Filter) -> ProviderResult<Vec<Log>> {
        self.log_queries.fetch_add(1, Ordering::Relaxed);
        let chain = self.chain.read();
        let hashes: Vec<B256> = match filter.get_block_hash() {
            Some(hash) => vec![hash],
            None => {
                let from = filter.get_from_block().unwrap_or_default();
                let to = filter.get_to_block().unwrap_or(u64::MAX);
                chain.headers.range(from..=to).map(|(_, header)| header.hash()).collect()
            }
        };
        Ok(hashes
            .iter()
            .filter_map(|hash| chain.logs.get(hash))
            .flatten()
            .filter(|log| {
                log.inner.data.topics().first().is_some_and(|topic| filter.topics[0].matches(topic))
            })
            .cloned()
            .collect())
    }

    async fn transaction_by_hash(&self, hash: B256) -> ProviderResult<Option<TxEnvelope>> {
        Ok(self.chain.read().transactions.get(&hash).cloned())
    }
}
