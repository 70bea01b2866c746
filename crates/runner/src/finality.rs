//! Tracking of the safe and finalized parent chain heads.

use alloy_eips::BlockNumberOrTag;
use mel_primitives::{BacklogError, BacklogResult, FinalizedReadOracle};
use mel_providers::ParentChainClient;
use parking_lot::Mutex;
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::watch;

/// Marks an unknown block number.
const UNKNOWN: u64 = u64::MAX;

#[derive(Debug)]
struct Inner {
    safe: AtomicU64,
    finalized: AtomicU64,
    /// The delayed read count of persisted states, by parent chain block number.
    read_counts: Mutex<BTreeMap<u64, u64>>,
}

/// The safe and finalized parent chain block numbers, written by the finality watchdog and read
/// by the runner.
///
/// The handle also serves the finalized-and-read watermark of the delayed message backlog: the
/// delayed read count of the latest persisted state at or below the finalized block.
#[derive(Debug, Clone)]
pub struct FinalityWatermarks(Arc<Inner>);

impl Default for FinalityWatermarks {
    fn default() -> Self {
        Self(Arc::new(Inner {
            safe: AtomicU64::new(UNKNOWN),
            finalized: AtomicU64::new(UNKNOWN),
            read_counts: Mutex::default(),
        }))
    }
}

impl FinalityWatermarks {
    /// Returns the safe block number, if known.
    pub fn safe(&self) -> Option<u64> {
        Some(self.0.safe.load(Ordering::Acquire)).filter(|n| *n != UNKNOWN)
    }

    /// Returns the finalized block number, if known.
    pub fn finalized(&self) -> Option<u64> {
        Some(self.0.finalized.load(Ordering::Acquire)).filter(|n| *n != UNKNOWN)
    }

    /// Sets the safe block number.
    pub fn set_safe(&self, number: u64) {
        self.0.safe.store(number, Ordering::Release);
    }

    /// Sets the finalized block number.
    pub fn set_finalized(&self, number: u64) {
        self.0.finalized.store(number, Ordering::Release);
    }

    /// Records the delayed read count of the state persisted for `block_number`.
    pub fn publish_read_count(&self, block_number: u64, delayed_messages_read: u64) {
        let mut read_counts = self.0.read_counts.lock();
        // states above a reorged block are stale.
        read_counts.retain(|number, _| *number < block_number);
        read_counts.insert(block_number, delayed_messages_read);

        // keep the latest entry at or below the finalized block, drop the ones before it.
        if let Some(finalized) = self.finalized() {
            if let Some((&anchor, _)) = read_counts.range(..=finalized).next_back() {
                read_counts.retain(|number, _| *number >= anchor);
            }
        }
    }
}

impl FinalityWatermarks {
    /// Returns the number of persisted states whose read count is retained.
    pub fn published_count(&self) -> usize {
        self.0.read_counts.lock().len()
    }
}

impl FinalizedReadOracle for FinalityWatermarks {
    fn finalized_and_read_index(&self) -> BacklogResult<u64> {
        let finalized = self
            .finalized()
            .ok_or_else(|| BacklogError::WatermarkUnavailable("finalized block unknown".into()))?;
        self.0
            .read_counts
            .lock()
            .range(..=finalized)
            .next_back()
            .map(|(_, read)| *read)
            .ok_or_else(|| {
                BacklogError::WatermarkUnavailable(format!(
                    "no persisted state at or below finalized block {finalized}"
                ))
            })
    }
}

/// Polls the safe and finalized parent chain headers into the [`FinalityWatermarks`].
#[derive(Debug)]
pub struct FinalityWatchdog<C> {
    client: C,
    watermarks: FinalityWatermarks,
    interval: Duration,
}

impl<C: ParentChainClient + 'static> FinalityWatchdog<C> {
    /// Returns a new [`FinalityWatchdog`].
    pub const fn new(client: C, watermarks: FinalityWatermarks, interval: Duration) -> Self {
        Self { client, watermarks, interval }
    }

    /// Spawns the watchdog, polling until the shutdown signal fires.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Polls the headers once.
    pub async fn poll(&self) {
        if let Some(number) = self.block_number(BlockNumberOrTag::Safe).await {
            self.watermarks.set_safe(number);
        }
        if let Some(number) = self.block_number(BlockNumberOrTag::Finalized).await {
            self.watermarks.set_finalized(number);
        }
        tracing::trace!(
            target: "mel::runner",
            safe = ?self.watermarks.safe(),
            finalized = ?self.watermarks.finalized(),
            "polled parent chain finality"
        );
    }

    async fn block_number(&self, tag: BlockNumberOrTag) -> Option<u64> {
        match self.client.header_by_number(tag).await {
            Ok(header) => header.map(|header| header.number),
            Err(err) => {
                tracing::warn!(target: "mel::runner", %tag, ?err, "failed to poll parent chain finality");
                None
            }
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            self.poll().await;
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => break,
            }
        }
        tracing::debug!(target: "mel::runner", "finality watchdog stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;
    use mel_primitives::test_utils::header_chain;
    use mel_providers::test_utils::MockParentChain;

    #[test]
    fn test_oracle_uses_latest_state_below_finalized() {
        let watermarks = FinalityWatermarks::default();
        assert!(watermarks.finalized_and_read_index().is_err());

        watermarks.publish_read_count(10, 3);
        watermarks.publish_read_count(11, 5);
        watermarks.publish_read_count(13, 8);
        assert!(matches!(
            watermarks.finalized_and_read_index(),
            Err(BacklogError::WatermarkUnavailable(_))
        ));

        watermarks.set_finalized(12);
        assert_eq!(watermarks.finalized_and_read_index(), Ok(5));
        watermarks.publish_read_count(14, 8);
        assert_eq!(watermarks.published_count(), 3);
        assert_eq!(watermarks.finalized_and_read_index(), Ok(5));
        watermarks.set_finalized(9);
        assert!(watermarks.finalized_and_read_index().is_err());
    }

    #[test]
    fn test_reorged_read_counts_are_dropped() {
        let watermarks = FinalityWatermarks::default();
        watermarks.set_finalized(20);
        watermarks.publish_read_count(10, 3);
        watermarks.publish_read_count(11, 5);

        // the state at 11 is replaced after a reorg.
        watermarks.publish_read_count(11, 4);
        assert_eq!(watermarks.finalized_and_read_index(), Ok(4));

        watermarks.publish_read_count(10, 3);
        assert_eq!(watermarks.finalized_and_read_index(), Ok(3));
    }

    #[tokio::test]
    async fn test_watchdog_polls_finality() -> eyre::Result<()> {
        // Given
        let chain = MockParentChain::default();
        for header in header_chain(0, 10, B256::ZERO, 0) {
            chain.push_block(header, Vec::new());
        }
        let watermarks = FinalityWatermarks::default();
        let watchdog =
            FinalityWatchdog::new(chain.clone(), watermarks.clone(), Duration::from_secs(1));

        // When
        watchdog.poll().await;
        let unknown = (watermarks.safe(), watermarks.finalized());
        chain.set_safe(8);
        chain.set_finalized(4);
        watchdog.poll().await;

        // Then
        assert_eq!(unknown, (None, None));
        assert_eq!(watermarks.safe(), Some(8));
        assert_eq!(watermarks.finalized(), Some(4));
        Ok(())
    }
}
