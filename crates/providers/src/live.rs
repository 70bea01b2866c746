//! The live parent chain data source.

use crate::{LogsFetcher, ProviderError, ProviderResult, TransactionFetcher};
use alloy_consensus::{Sealed, TxEnvelope};
use alloy_eips::BlockNumberOrTag;
use alloy_primitives::B256;
use alloy_provider::Provider;
use alloy_rpc_types_eth::{Filter, Log};
use lru::LruCache;
use mel_l1::EventSchema;
use mel_primitives::ParentChainHeader;
use parking_lot::Mutex;
use std::{collections::HashMap, fmt, num::NonZeroUsize, sync::Arc};

/// The RPC surface of the parent chain used by the [`LiveDataSource`].
#[async_trait::async_trait]
#[auto_impl::auto_impl(Arc, &)]
pub trait ParentChainClient: Send + Sync {
    /// Returns the header at the provided number or tag.
    async fn header_by_number(
        &self,
        number: BlockNumberOrTag,
    ) -> ProviderResult<Option<ParentChainHeader>>;

    /// Returns the logs matching the filter.
    async fn logs(&self, filter: &Filter) -> ProviderResult<Vec<Log>>;

    /// Returns the transaction with the provided hash.
    async fn transaction_by_hash(&self, hash: B256) -> ProviderResult<Option<TxEnvelope>>;
}

/// A [`ParentChainClient`] over an alloy [`Provider`].
#[derive(Clone)]
pub struct RpcParentChain<P>(P);

impl<P> RpcParentChain<P> {
    /// Wraps the provider.
    pub const fn new(provider: P) -> Self {
        Self(provider)
    }
}

impl<P> fmt::Debug for RpcParentChain<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcParentChain").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl<P: Provider> ParentChainClient for RpcParentChain<P> {
    async fn header_by_number(
        &self,
        number: BlockNumberOrTag,
    ) -> ProviderResult<Option<ParentChainHeader>> {
        let block = self.0.get_block_by_number(number).await?;
        Ok(block.map(|block| Sealed::new_unchecked(block.header.inner, block.header.hash)))
    }

    async fn logs(&self, filter: &Filter) -> ProviderResult<Vec<Log>> {
        Ok(self.0.get_logs(filter).await?)
    }

    async fn transaction_by_hash(&self, hash: B256) -> ProviderResult<Option<TxEnvelope>> {
        let tx = self.0.get_transaction_by_hash(hash).await?;
        Ok(tx.map(|tx| tx.inner.into_inner()))
    }
}

/// Reads parent chain data over RPC, caching headers and inbox logs fetched ahead of the
/// extraction cursor.
pub struct LiveDataSource<C> {
    client: C,
    topics: Vec<B256>,
    headers: Mutex<LruCache<u64, ParentChainHeader>>,
    logs: Mutex<LruCache<B256, Arc<Vec<Log>>>>,
}

impl<C> fmt::Debug for LiveDataSource<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveDataSource")
            .field("cached_headers", &self.headers.lock().len())
            .field("cached_logs", &self.logs.lock().len())
            .finish_non_exhaustive()
    }
}

impl<C: ParentChainClient> LiveDataSource<C> {
    /// Returns a new [`LiveDataSource`] retaining at most `cache_size` blocks.
    pub fn new(client: C, schema: &EventSchema, cache_size: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            client,
            topics: schema.topics().collect(),
            headers: Mutex::new(LruCache::new(capacity)),
            logs: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Returns the underlying client.
    pub const fn client(&self) -> &C {
        &self.client
    }

    /// Returns the header at `number`, if the parent chain produced it.
    pub async fn header_by_number(&self, number: u64) -> ProviderResult<Option<ParentChainHeader>> {
        if let Some(header) = self.headers.lock().get(&number) {
            return Ok(Some(header.clone()))
        }
        let header = self.client.header_by_number(number.into()).await?;
        if let Some(header) = &header {
            self.headers.lock().put(number, header.clone());
        }
        Ok(header)
    }

    /// Fetches the headers and inbox logs of `count` blocks starting at `from`. Returns the
    /// number of headers the parent chain could provide.
    #[tracing::instrument(target = "mel::providers", skip(self))]
    pub async fn prefetch(&self, from: u64, count: u64) -> ProviderResult<usize> {
        if count == 0 {
            return Ok(0)
        }
        let to = from.saturating_add(count - 1);
        let headers = futures::future::try_join_all(
            (from..=to).map(|number| self.client.header_by_number(number.into())),
        );
        let filter =
            Filter::new().from_block(from).to_block(to).event_signature(self.topics.clone());
        let logs = self.client.logs(&filter);
        let (headers, logs) = tokio::try_join!(headers, logs)?;

        let mut by_number: HashMap<u64, Vec<Log>> = HashMap::new();
        for log in logs {
            let Some(number) = log.block_number else { continue };
            by_number.entry(number).or_default().push(log);
        }

        let mut fetched = 0;
        for header in headers.into_iter().map_while(|header| header) {
            let hash = header.hash();
            let logs = by_number.remove(&header.number).unwrap_or_default();
            // logs from a competing block are refetched by hash on demand.
            if logs.iter().all(|log| log.block_hash == Some(hash)) {
                self.logs.lock().put(hash, Arc::new(self.normalize(logs)));
            } else {
                tracing::debug!(target: "mel::providers", number = header.number, "prefetched logs span a reorg");
            }
            self.headers.lock().put(header.number, header);
            fetched += 1;
        }

        tracing::trace!(target: "mel::providers", fetched, "prefetched parent chain blocks");
        Ok(fetched)
    }

    /// Discards every cached header and log.
    pub fn clear_cache(&self) {
        self.headers.lock().clear();
        self.logs.lock().clear();
    }

    fn normalize(&self, mut logs: Vec<Log>) -> Vec<Log> {
        logs.retain(|log| log.inner.data.topics().first().is_some_and(|t| self.topics.contains(t)));
        for log in &mut logs {
            log.block_timestamp = None;
            log.removed = false;
        }
        logs.sort_by_key(|log| log.log_index);
        logs
    }
}

#[async_trait::async_trait]
impl<C: ParentChainClient> LogsFetcher for LiveDataSource<C> {
    async fn logs_for_block_hash(&self, block_hash: B256) -> ProviderResult<Vec<Log>> {
        if let Some(logs) = self.logs.lock().get(&block_hash) {
            return Ok(logs.as_ref().clone())
        }
        let filter = Filter::new().at_block_hash(block_hash).event_signature(self.topics.clone());
        let logs = self.normalize(self.client.logs(&filter).await?);
        self.logs.lock().put(block_hash, Arc::new(logs.clone()));
        Ok(logs)
    }
}

#[async_trait::async_trait]
impl<C: ParentChainClient> TransactionFetcher for LiveDataSource<C> {
    async fn transaction_by_log(&self, log: &Log) -> ProviderResult<TxEnvelope> {
        let hash = log.transaction_hash.ok_or(ProviderError::MissingLogMetadata("transaction hash"))?;
        self.client.transaction_by_hash(hash).await?.ok_or(ProviderError::TransactionNotFound(hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{inbox_log, transaction, MockParentChain};
    use alloy_primitives::Address;
    use mel_primitives::test_utils::header_chain;

    #[tokio::test]
    async fn test_prefetch_serves_cached_blocks() -> eyre::Result<()> {
        // Given
        let schema = EventSchema::new()?;
        let chain = MockParentChain::default();
        for header in header_chain(0, 4, B256::ZERO, 0) {
            let log = inbox_log(&schema, Address::repeat_byte(1), header.number);
            let tx = transaction(header.number, Address::ZERO, Default::default());
            chain.push_block(header, vec![(tx, vec![log])]);
        }
        let source = LiveDataSource::new(chain.clone(), &schema, 16);

        // When
        let fetched = source.prefetch(1, 10).await?;

        // Then
        assert_eq!(fetched, 3);
        let queries = chain.log_queries();
        let header = source.header_by_number(2).await?.ok_or_else(|| eyre::eyre!("no header"))?;
        let logs = source.logs_for_block_hash(header.hash()).await?;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].block_number, Some(2));
        assert!(logs[0].block_timestamp.is_none());
        assert_eq!(chain.log_queries(), queries);

        // When
        source.clear_cache();
        source.logs_for_block_hash(header.hash()).await?;

        // Then
        assert_eq!(chain.log_queries(), queries + 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_logs_are_restricted_to_schema() -> eyre::Result<()> {
        // Given
        let schema = EventSchema::new()?;
        let chain = MockParentChain::default();
        let header = header_chain(0, 1, B256::ZERO, 0).remove(0);
        let foreign = alloy_primitives::Log::new_unchecked(
            Address::ZERO,
            vec![B256::repeat_byte(0xee)],
            Default::default(),
        );
        let inbox = inbox_log(&schema, Address::ZERO, 0);
        let tx = transaction(0, Address::ZERO, Default::default());
        chain.push_block(header.clone(), vec![(tx, vec![foreign, inbox])]);
        let source = LiveDataSource::new(chain, &schema, 16);

        // When
        let logs = source.logs_for_block_hash(header.hash()).await?;

        // Then
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].log_index, Some(1));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_header_is_not_an_error() -> eyre::Result<()> {
        let schema = EventSchema::new()?;
        let source = LiveDataSource::new(MockParentChain::default(), &schema, 16);
        assert!(source.header_by_number(5).await?.is_none());
        Ok(())
    }
}
