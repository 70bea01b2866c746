use crate::{
    block_logs,
    replay::{trie_get, PreimageResolver},
    LogsFetcher, ProviderError, ProviderResult, TransactionFetcher,
};
use alloy_consensus::{Header, ReceiptEnvelope, Sealed, TxEnvelope};
use alloy_eips::eip2718::Decodable2718;
use alloy_primitives::B256;
use alloy_rlp::Decodable;
use alloy_rpc_types_eth::Log;
use mel_l1::EventSchema;
use mel_primitives::ParentChainHeader;
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};

/// The decoded body of a replayed block.
#[derive(Debug)]
struct ReplayBlock {
    transactions: Vec<TxEnvelope>,
    logs: Vec<Log>,
}

/// Reads parent chain blocks from preimages.
///
/// A block is rebuilt from its hash: the header is the preimage of the hash, and the
/// transactions and receipts are read from their tries until the first absent index.
#[derive(Debug)]
pub struct ReplayDataSource<R> {
    resolver: R,
    topics: Vec<B256>,
    blocks: Mutex<HashMap<B256, Arc<ReplayBlock>>>,
}

impl<R: PreimageResolver> ReplayDataSource<R> {
    /// Returns a new [`ReplayDataSource`].
    pub fn new(resolver: R, schema: &EventSchema) -> Self {
        Self { resolver, topics: schema.topics().collect(), blocks: Default::default() }
    }

    /// Returns the resolver.
    pub const fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Returns the header with the provided hash.
    pub async fn header(&self, block_hash: B256) -> ProviderResult<ParentChainHeader> {
        let encoded = self.resolver.resolve_keccak(block_hash).await?;
        let header = Header::decode(&mut encoded.as_ref())?;
        Ok(Sealed::new_unchecked(header, block_hash))
    }

    async fn block(&self, block_hash: B256) -> ProviderResult<Arc<ReplayBlock>> {
        if let Some(block) = self.blocks.lock().get(&block_hash) {
            return Ok(block.clone())
        }

        let header = self.header(block_hash).await?;
        let mut transactions = Vec::new();
        let mut receipts = Vec::new();
        for index in 0u64.. {
            let key = alloy_rlp::encode(index);
            let Some(tx) = trie_get(&self.resolver, header.transactions_root, &key).await? else {
                break
            };
            let receipt = trie_get(&self.resolver, header.receipts_root, &key)
                .await?
                .ok_or(ProviderError::InvalidTrieNode("transaction without receipt"))?;
            transactions.push(TxEnvelope::decode_2718(&mut tx.as_ref())?);
            receipts.push(ReceiptEnvelope::decode_2718(&mut receipt.as_ref())?);
        }

        let mut logs = block_logs(
            block_hash,
            header.number,
            transactions.iter().zip(&receipts).map(|(tx, receipt)| (*tx.tx_hash(), receipt.logs())),
        );
        logs.retain(|log| log.inner.data.topics().first().is_some_and(|t| self.topics.contains(t)));

        tracing::trace!(
            target: "mel::replay",
            number = header.number,
            transactions = transactions.len(),
            logs = logs.len(),
            "replayed block"
        );

        let block = Arc::new(ReplayBlock { transactions, logs });
        self.blocks.lock().insert(block_hash, block.clone());
        Ok(block)
    }
}

#[async_trait::async_trait]
impl<R: PreimageResolver> LogsFetcher for ReplayDataSource<R> {
    async fn logs_for_block_hash(&self, block_hash: B256) -> ProviderResult<Vec<Log>> {
        Ok(self.block(block_hash).await?.logs.clone())
    }
}

#[async_trait::async_trait]
impl<R: PreimageResolver> TransactionFetcher for ReplayDataSource<R> {
    async fn transaction_by_log(&self, log: &Log) -> ProviderResult<TxEnvelope> {
        let block_hash = log.block_hash.ok_or(ProviderError::MissingLogMetadata("block hash"))?;
        let index =
            log.transaction_index.ok_or(ProviderError::MissingLogMetadata("transaction index"))?;
        let block = self.block(block_hash).await?;
        block
            .transactions
            .get(index as usize)
            .cloned()
            .ok_or(ProviderError::TransactionNotFound(log.transaction_hash.unwrap_or_default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        replay::MemoryPreimageResolver,
        test_utils::{inbox_log, replayable_block, transaction, MockParentChain},
        LiveDataSource,
    };
    use alloy_primitives::{Address, Bytes, LogData};

    #[tokio::test]
    async fn test_live_and_replay_sources_agree() -> eyre::Result<()> {
        // Given
        let schema = EventSchema::new()?;
        let other = alloy_primitives::Log {
            address: Address::repeat_byte(9),
            data: LogData::new_unchecked(vec![B256::repeat_byte(9)], Bytes::new()),
        };
        let transactions: Vec<_> = (0..20u64)
            .map(|i| {
                let logs = match i % 3 {
                    0 => vec![inbox_log(&schema, Address::repeat_byte(1), i)],
                    1 => vec![other.clone(), inbox_log(&schema, Address::repeat_byte(1), i)],
                    _ => vec![],
                };
                (transaction(i, Address::repeat_byte(2), Bytes::from(vec![i as u8; 40])), logs)
            })
            .collect();
        let (header, preimages) = replayable_block(7, B256::ZERO, &transactions);

        let chain = MockParentChain::default();
        chain.push_block(header.clone(), transactions);
        let live = LiveDataSource::new(chain, &schema, 4);

        let resolver = MemoryPreimageResolver::default();
        resolver.extend_keccak(preimages)?;
        let replay = ReplayDataSource::new(resolver, &schema);

        // When
        let live_logs = live.logs_for_block_hash(header.hash()).await?;
        let replay_logs = replay.logs_for_block_hash(header.hash()).await?;

        // Then
        assert_eq!(replay.header(header.hash()).await?, header);
        assert_eq!(live_logs.len(), 14);
        assert_eq!(live_logs, replay_logs);
        for log in &live_logs {
            assert_eq!(
                live.transaction_by_log(log).await?,
                replay.transaction_by_log(log).await?
            );
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_block_preimage() -> eyre::Result<()> {
        let schema = EventSchema::new()?;
        let replay = ReplayDataSource::new(MemoryPreimageResolver::default(), &schema);
        let res = replay.logs_for_block_hash(B256::repeat_byte(1)).await;
        assert!(matches!(res, Err(ProviderError::MissingPreimage { .. })));
        Ok(())
    }
}
