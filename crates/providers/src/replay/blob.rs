use crate::{
    replay::{PreimageResolver, PreimageType},
    BlobProvider, ProviderError, ProviderResult,
};
use alloy_eips::eip4844::Blob;
use alloy_primitives::B256;
use std::sync::Arc;

/// A [`BlobProvider`] resolving blobs as preimages of their versioned hash.
#[derive(Debug, Clone)]
pub struct ReplayBlobProvider<R> {
    resolver: R,
}

impl<R> ReplayBlobProvider<R> {
    /// Returns a new [`ReplayBlobProvider`].
    pub const fn new(resolver: R) -> Self {
        Self { resolver }
    }
}

#[async_trait::async_trait]
impl<R: PreimageResolver> BlobProvider for ReplayBlobProvider<R> {
    async fn blob(&self, _block_timestamp: u64, hash: B256) -> ProviderResult<Option<Arc<Blob>>> {
        let preimage =
            self.resolver.resolve_typed_preimage(PreimageType::EthVersionedHash, hash).await?;
        let blob = Blob::try_from(preimage.as_ref())
            .map_err(|_| ProviderError::MalformedPreimage { hash, reason: "invalid blob size" })?;
        Ok(Some(Arc::new(blob)))
    }
}
