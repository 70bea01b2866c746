//! Exposes the [`BlobProvider`] trait allowing to retrieve blobs.

mod client;
pub use client::BeaconClientProvider;

mod mock;
pub use mock::MockBlobProvider;

use crate::ProviderResult;
use std::sync::Arc;

use alloy_eips::eip4844::Blob;
use alloy_primitives::B256;

/// An instance of the trait can be used to fetch parent chain blob data.
#[async_trait::async_trait]
#[auto_impl::auto_impl(Arc, &)]
pub trait BlobProvider: Sync + Send {
    /// Returns the blob with the provided versioned hash, attached to a block at
    /// `block_timestamp`.
    async fn blob(&self, block_timestamp: u64, hash: B256) -> ProviderResult<Option<Arc<Blob>>>;
}
