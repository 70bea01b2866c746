//! The delayed message backlog.
//!
//! A contiguous window of `(index, digest, block)` entries for delayed messages seen on the parent
//! chain but not yet known to be finalized and read. Entries appended while a block is being
//! extracted are dirty until [`DelayedMessageBacklog::commit_dirties`] is called.

use alloy_primitives::B256;
use std::{collections::VecDeque, fmt, sync::Arc};

/// A [`Result`] that uses [`BacklogError`] as the error type.
pub type BacklogResult<T> = Result<T, BacklogError>;

/// An error related to the delayed message backlog.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BacklogError {
    /// The added entry does not extend the window.
    #[error("backlog entry index {got} is not sequential, expected {expected}")]
    NonSequentialIndex {
        /// The expected index.
        expected: u64,
        /// The provided index.
        got: u64,
    },
    /// The requested index is outside the window.
    #[error("delayed message index {index} out of backlog range [{first}, {end})")]
    OutOfRange {
        /// The requested index.
        index: u64,
        /// The first index of the window.
        first: u64,
        /// The end of the window.
        end: u64,
    },
    /// A reorg was requested while dirty entries are pending.
    #[error("cannot reorg the backlog with {0} dirty entries pending")]
    DirtyEntriesPending(usize),
    /// The finalized-and-read watermark is not available.
    #[error("finalized and read delayed index unavailable: {0}")]
    WatermarkUnavailable(String),
}

/// One delayed message witness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayedMessageBacklogEntry {
    /// The global delayed message index.
    pub index: u64,
    /// The accumulator item of the message at this index.
    pub digest: B256,
    /// The parent chain block in which the message was first seen.
    pub parent_chain_block_number: u64,
}

/// Returns the number of delayed messages which are both finalized and read.
#[auto_impl::auto_impl(Arc, &)]
pub trait FinalizedReadOracle: Send + Sync + fmt::Debug {
    /// Returns the finalized-and-read watermark. Entries below it are safe to drop.
    fn finalized_and_read_index(&self) -> BacklogResult<u64>;
}

/// A bounded, reorg aware window of delayed message witnesses.
///
/// Cloning copies the entries and shares the oracle.
#[derive(Clone)]
pub struct DelayedMessageBacklog {
    entries: VecDeque<DelayedMessageBacklogEntry>,
    /// Number of entries from the front which are committed.
    committed: usize,
    /// Target capacity, zero is unbounded.
    capacity: usize,
    oracle: Option<Arc<dyn FinalizedReadOracle>>,
}

impl fmt::Debug for DelayedMessageBacklog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayedMessageBacklog")
            .field("first", &self.first_index())
            .field("len", &self.entries.len())
            .field("committed", &self.committed)
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl DelayedMessageBacklog {
    /// Returns a new empty backlog. A capacity of zero never triggers trimming.
    pub fn new(capacity: usize, oracle: Option<Arc<dyn FinalizedReadOracle>>) -> Self {
        Self { entries: VecDeque::new(), committed: 0, capacity, oracle }
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the backlog is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the index of the first entry.
    pub fn first_index(&self) -> Option<u64> {
        self.entries.front().map(|entry| entry.index)
    }

    /// Returns the number of dirty entries.
    pub fn dirty_len(&self) -> usize {
        self.entries.len() - self.committed
    }

    /// Returns an iterator over the entries.
    pub fn iter(&self) -> impl Iterator<Item = &DelayedMessageBacklogEntry> {
        self.entries.iter()
    }

    fn end_index(&self) -> Option<u64> {
        self.entries.back().map(|entry| entry.index + 1)
    }

    /// Appends an entry to the window.
    pub fn add(&mut self, entry: DelayedMessageBacklogEntry) -> BacklogResult<()> {
        if let Some(expected) = self.end_index() {
            if entry.index != expected {
                return Err(BacklogError::NonSequentialIndex { expected, got: entry.index })
            }
        }
        self.entries.push_back(entry);

        if self.capacity != 0 && self.entries.len() > self.capacity {
            if let Err(err) = self.trim() {
                tracing::warn!(target: "mel::backlog", ?err, "deferring delayed backlog trim");
            }
        }
        Ok(())
    }

    /// Returns the entry at `index`.
    pub fn get(&self, index: u64) -> BacklogResult<&DelayedMessageBacklogEntry> {
        let first = self.first_index().unwrap_or_default();
        let end = self.end_index().unwrap_or_default();
        if index < first || index >= end {
            return Err(BacklogError::OutOfRange { index, first, end })
        }
        Ok(&self.entries[(index - first) as usize])
    }

    /// Removes committed entries below the finalized-and-read watermark.
    pub fn trim(&mut self) -> BacklogResult<()> {
        let Some(oracle) = &self.oracle else { return Ok(()) };
        let Some(first) = self.first_index() else { return Ok(()) };
        let watermark = oracle.finalized_and_read_index()?;
        self.trim_below(first, watermark);
        Ok(())
    }

    /// Removes committed entries with an index strictly below `watermark`.
    pub fn trim_to(&mut self, watermark: u64) {
        if let Some(first) = self.first_index() {
            self.trim_below(first, watermark);
        }
    }

    fn trim_below(&mut self, first: u64, watermark: u64) {
        let removable = (watermark.saturating_sub(first) as usize).min(self.committed);
        if removable == 0 {
            return
        }
        self.entries.drain(..removable);
        self.committed -= removable;
        tracing::trace!(target: "mel::backlog", removable, watermark, first = ?self.first_index(), "trimmed delayed backlog");
    }

    /// Rolls the window back so that it covers at most `new_seen_count` messages.
    pub fn reorg(&mut self, new_seen_count: u64) -> BacklogResult<()> {
        if self.dirty_len() != 0 {
            return Err(BacklogError::DirtyEntriesPending(self.dirty_len()))
        }
        let Some(first) = self.first_index() else { return Ok(()) };
        if new_seen_count < first {
            self.entries.clear();
        } else {
            self.entries.truncate((new_seen_count - first) as usize);
        }
        self.committed = self.entries.len();
        Ok(())
    }

    /// Marks all entries as committed, making them eligible for trimming.
    pub fn commit_dirties(&mut self) {
        self.committed = self.entries.len();
    }

    /// Drops all entries added since the last commit.
    pub fn discard_dirties(&mut self) {
        self.entries.truncate(self.committed);
    }
}

impl PartialEq for DelayedMessageBacklog {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries &&
            self.committed == other.committed &&
            self.capacity == other.capacity
    }
}

impl Eq for DelayedMessageBacklog {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Debug, Default)]
    struct Watermark(AtomicU64);

    impl FinalizedReadOracle for Watermark {
        fn finalized_and_read_index(&self) -> BacklogResult<u64> {
            Ok(self.0.load(Ordering::Relaxed))
        }
    }

    #[derive(Debug)]
    struct Unavailable;

    impl FinalizedReadOracle for Unavailable {
        fn finalized_and_read_index(&self) -> BacklogResult<u64> {
            Err(BacklogError::WatermarkUnavailable("not synced".to_string()))
        }
    }

    fn entry(index: u64) -> DelayedMessageBacklogEntry {
        DelayedMessageBacklogEntry {
            index,
            digest: B256::with_last_byte(index as u8),
            parent_chain_block_number: index / 5,
        }
    }

    fn backlog(
        range: std::ops::Range<u64>,
        capacity: usize,
        oracle: Option<Arc<dyn FinalizedReadOracle>>,
    ) -> DelayedMessageBacklog {
        let mut backlog = DelayedMessageBacklog::new(capacity, oracle);
        for i in range {
            backlog.add(entry(i)).unwrap();
        }
        backlog.commit_dirties();
        backlog
    }

    #[test]
    fn test_add_is_sequential() {
        // Given
        let mut backlog = backlog(3..6, 0, None);

        // When
        let res = backlog.add(entry(7));

        // Then
        assert_eq!(res, Err(BacklogError::NonSequentialIndex { expected: 6, got: 7 }));
        assert_eq!(backlog.len(), 3);
        assert_eq!(backlog.get(5).unwrap().index, 5);
        assert!(backlog.add(entry(6)).is_ok());
    }

    #[test]
    fn test_get_out_of_range() {
        let backlog = backlog(3..6, 0, None);
        assert_eq!(backlog.get(2), Err(BacklogError::OutOfRange { index: 2, first: 3, end: 6 }));
        assert!(backlog.get(6).is_err());
        assert_eq!(backlog.get(4).unwrap().digest, B256::with_last_byte(4));
    }

    #[test]
    fn test_trim_then_reorg() {
        // Given
        let watermark = Arc::new(Watermark::default());
        let mut backlog = backlog(0..25, 0, Some(watermark.clone()));

        // When
        watermark.0.store(7, Ordering::Relaxed);
        backlog.trim().unwrap();

        // Then
        assert_eq!(backlog.len(), 18);
        assert_eq!(backlog.first_index(), Some(7));

        // When
        backlog.reorg(20).unwrap();

        // Then
        assert_eq!(backlog.len(), 13);
        assert_eq!(backlog.first_index(), Some(7));
        assert_eq!(backlog.iter().last().unwrap().index, 19);
    }

    #[test]
    fn test_reorg_is_idempotent() {
        let mut backlog = backlog(0..25, 0, None);
        backlog.reorg(12).unwrap();
        let first: Vec<_> = backlog.iter().copied().collect();
        backlog.reorg(12).unwrap();
        let second: Vec<_> = backlog.iter().copied().collect();
        assert_eq!(first, second);
        assert_eq!(second.len(), 12);
    }

    #[test]
    fn test_reorg_below_window_clears() {
        let mut backlog = backlog(10..20, 0, None);
        backlog.reorg(5).unwrap();
        assert!(backlog.is_empty());
        // the window restarts at any index.
        backlog.add(entry(5)).unwrap();
        assert_eq!(backlog.first_index(), Some(5));
    }

    #[test]
    fn test_reorg_with_dirty_entries_fails() {
        let mut backlog = backlog(0..5, 0, None);
        backlog.add(entry(5)).unwrap();
        assert_eq!(backlog.reorg(3), Err(BacklogError::DirtyEntriesPending(1)));
        backlog.discard_dirties();
        assert_eq!(backlog.len(), 5);
        assert!(backlog.reorg(3).is_ok());
    }

    #[test]
    fn test_trim_never_removes_dirty_entries() {
        // Given
        let watermark = Arc::new(Watermark::default());
        let mut backlog = backlog(0..4, 0, Some(watermark.clone()));
        for i in 4..10 {
            backlog.add(entry(i)).unwrap();
        }

        // When
        watermark.0.store(8, Ordering::Relaxed);
        backlog.trim().unwrap();

        // Then
        assert_eq!(backlog.first_index(), Some(4));
        assert_eq!(backlog.dirty_len(), 6);
    }

    #[test]
    fn test_capacity_triggers_trim() {
        // Given
        let watermark = Arc::new(Watermark(AtomicU64::new(6)));
        let mut backlog = backlog(0..8, 8, Some(watermark));

        // When
        backlog.add(entry(8)).unwrap();

        // Then
        assert_eq!(backlog.first_index(), Some(6));
        assert_eq!(backlog.len(), 3);
    }

    #[test]
    fn test_trim_failure_is_deferred() {
        // Given
        let mut backlog = backlog(0..8, 4, Some(Arc::new(Unavailable)));

        // When
        let res = backlog.add(entry(8));

        // Then
        assert!(res.is_ok());
        assert_eq!(backlog.len(), 9);
        assert!(backlog.trim().is_err());
    }

    #[test]
    fn test_clone_is_independent() {
        // Given
        let backlog = backlog(0..4, 0, None);
        let mut clone = backlog.clone();

        // When
        clone.add(entry(4)).unwrap();
        clone.commit_dirties();

        // Then
        assert_eq!(backlog.len(), 4);
        assert_eq!(backlog.dirty_len(), 0);
        assert_eq!(clone.len(), 5);
        assert_ne!(backlog, clone);
    }
}
