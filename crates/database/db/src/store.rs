use crate::error::DatabaseResult;
use parking_lot::RwLock;
use std::{collections::BTreeMap, fmt::Debug, sync::Arc};

/// A set of writes applied atomically.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WriteBatch {
    puts: Vec<(Vec<u8>, Vec<u8>)>,
}

impl WriteBatch {
    /// Queues a put.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.puts.push((key, value));
    }

    /// Returns the number of queued writes.
    pub fn len(&self) -> usize {
        self.puts.len()
    }

    /// Returns true if no writes are queued.
    pub fn is_empty(&self) -> bool {
        self.puts.is_empty()
    }
}

impl IntoIterator for WriteBatch {
    type Item = (Vec<u8>, Vec<u8>);
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.puts.into_iter()
    }
}

/// A byte keyed store. Implementations must apply a [`WriteBatch`] atomically.
#[async_trait::async_trait]
#[auto_impl::auto_impl(Arc, &)]
pub trait KeyValueStore: Send + Sync + Debug {
    /// Returns the value stored at key.
    async fn get(&self, key: &[u8]) -> DatabaseResult<Option<Vec<u8>>>;

    /// Returns true if a value is stored at key.
    async fn has(&self, key: &[u8]) -> DatabaseResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Applies all writes of the batch atomically.
    async fn write(&self, batch: WriteBatch) -> DatabaseResult<()>;
}

/// An in memory [`KeyValueStore`].
#[derive(Debug, Default, Clone)]
pub struct MemoryKeyValueStore {
    inner: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryKeyValueStore {
    /// Returns the number of stored keys.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &[u8]) -> DatabaseResult<Option<Vec<u8>>> {
        Ok(self.inner.read().get(key).cloned())
    }

    async fn write(&self, batch: WriteBatch) -> DatabaseResult<()> {
        let mut inner = self.inner.write();
        inner.extend(batch);
        Ok(())
    }
}
