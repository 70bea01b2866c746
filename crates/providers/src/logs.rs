use crate::ProviderResult;
use alloy_consensus::TxEnvelope;
use alloy_primitives::B256;
use alloy_rpc_types_eth::Log;

/// An instance of the trait can provide the inbox logs of a parent chain block.
///
/// Implementations only return logs whose first topic belongs to the
/// [`EventSchema`](mel_l1::EventSchema), ordered by log index, and normalise the block timestamp
/// to `None`.
#[async_trait::async_trait]
#[auto_impl::auto_impl(Arc, &)]
pub trait LogsFetcher: Send + Sync {
    /// Returns the inbox logs of the block.
    async fn logs_for_block_hash(&self, block_hash: B256) -> ProviderResult<Vec<Log>>;

    /// Returns the inbox logs of the transaction at `tx_index` in the block.
    async fn logs_for_tx_index(&self, block_hash: B256, tx_index: u64) -> ProviderResult<Vec<Log>> {
        let mut logs = self.logs_for_block_hash(block_hash).await?;
        logs.retain(|log| log.transaction_index == Some(tx_index));
        Ok(logs)
    }
}

/// An instance of the trait can provide the transaction that emitted a log.
#[async_trait::async_trait]
#[auto_impl::auto_impl(Arc, &)]
pub trait TransactionFetcher: Send + Sync {
    /// Returns the transaction which emitted the log.
    async fn transaction_by_log(&self, log: &Log) -> ProviderResult<TxEnvelope>;
}

/// Returns the RPC logs of a block, attaching the block and transaction metadata a node reports.
///
/// Log indices are counted over every log of the block, in transaction order.
pub fn block_logs<'a>(
    block_hash: B256,
    block_number: u64,
    transactions: impl IntoIterator<Item = (B256, &'a [alloy_primitives::Log])>,
) -> Vec<Log> {
    let mut log_index = 0u64;
    let mut out = Vec::new();
    for (tx_index, (tx_hash, logs)) in transactions.into_iter().enumerate() {
        for log in logs {
            out.push(Log {
                inner: log.clone(),
                block_hash: Some(block_hash),
                block_number: Some(block_number),
                block_timestamp: None,
                transaction_hash: Some(tx_hash),
                transaction_index: Some(tx_index as u64),
                log_index: Some(log_index),
                removed: false,
            });
            log_index += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, LogData};

    #[test]
    fn test_block_logs_count_indices_across_transactions() {
        // Given
        let log = alloy_primitives::Log {
            address: Address::ZERO,
            data: LogData::new_unchecked(vec![B256::ZERO], Default::default()),
        };
        let first = vec![log.clone(), log.clone()];
        let second = vec![log];

        // When
        let logs = block_logs(
            B256::repeat_byte(1),
            7,
            [(B256::repeat_byte(2), first.as_slice()), (B256::repeat_byte(3), second.as_slice())],
        );

        // Then
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[2].log_index, Some(2));
        assert_eq!(logs[2].transaction_index, Some(1));
        assert_eq!(logs[2].transaction_hash, Some(B256::repeat_byte(3)));
        assert_eq!(logs[0].block_number, Some(7));
    }
}
