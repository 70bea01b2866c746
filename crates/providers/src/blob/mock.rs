use crate::{BlobProvider, ProviderResult};
use std::{collections::HashMap, sync::Arc};

use alloy_eips::eip4844::{kzg_to_versioned_hash, Blob};
use alloy_primitives::B256;
use parking_lot::RwLock;

/// An in memory [`BlobProvider`] keyed by versioned hash.
#[derive(Debug, Default, Clone)]
pub struct MockBlobProvider {
    blobs: Arc<RwLock<HashMap<B256, Arc<Blob>>>>,
}

impl MockBlobProvider {
    /// Inserts a blob under the versioned hash of `commitment` and returns the hash.
    pub fn insert_with_commitment(&self, commitment: &[u8], blob: Blob) -> B256 {
        let hash = kzg_to_versioned_hash(commitment);
        self.insert(hash, blob);
        hash
    }

    /// Inserts a blob under the provided versioned hash.
    pub fn insert(&self, hash: B256, blob: Blob) {
        self.blobs.write().insert(hash, Arc::new(blob));
    }
}

#[async_trait::async_trait]
impl BlobProvider for MockBlobProvider {
    async fn blob(&self, _block_timestamp: u64, hash: B256) -> ProviderResult<Option<Arc<Blob>>> {
        Ok(self.blobs.read().get(&hash).cloned())
    }
}
