use crate::{ProviderError, ProviderResult};
use alloy_primitives::{keccak256, Bytes, B256};
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};

/// The kind of a content addressed preimage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PreimageType {
    /// Keyed by the keccak256 hash of the preimage.
    Keccak256 = 0,
    /// Keyed by the sha256 hash of the preimage.
    Sha2_256 = 1,
    /// A blob keyed by its EIP-4844 versioned hash.
    EthVersionedHash = 2,
}

impl TryFrom<u8> for PreimageType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Keccak256,
            1 => Self::Sha2_256,
            2 => Self::EthVersionedHash,
            other => return Err(other),
        })
    }
}

/// An instance of the trait resolves content addressed preimages. It is the only source of data
/// of the replay backend.
#[async_trait::async_trait]
#[auto_impl::auto_impl(Arc, &)]
pub trait PreimageResolver: Send + Sync {
    /// Returns the preimage of `hash`.
    async fn resolve_typed_preimage(&self, ty: PreimageType, hash: B256) -> ProviderResult<Bytes>;

    /// Returns the keccak preimage of `hash`.
    async fn resolve_keccak(&self, hash: B256) -> ProviderResult<Bytes> {
        self.resolve_typed_preimage(PreimageType::Keccak256, hash).await
    }

    /// Returns the two 32 byte halves of a 64 byte keccak preimage.
    async fn resolve_keccak_pair(&self, hash: B256) -> ProviderResult<(B256, B256)> {
        let preimage = self.resolve_keccak(hash).await?;
        if preimage.len() != 64 {
            return Err(ProviderError::MalformedPreimage { hash, reason: "expected 64 bytes" })
        }
        Ok((B256::from_slice(&preimage[..32]), B256::from_slice(&preimage[32..])))
    }
}

/// A [`PreimageResolver`] over in memory maps.
#[derive(Debug, Default, Clone)]
pub struct MemoryPreimageResolver {
    preimages: Arc<RwLock<HashMap<(PreimageType, B256), Bytes>>>,
}

impl MemoryPreimageResolver {
    /// Inserts a preimage. Keccak preimages are checked against their hash.
    pub fn insert(&self, ty: PreimageType, hash: B256, preimage: Bytes) -> ProviderResult<()> {
        if ty == PreimageType::Keccak256 && keccak256(&preimage) != hash {
            return Err(ProviderError::PreimageHashMismatch(hash))
        }
        self.preimages.write().insert((ty, hash), preimage);
        Ok(())
    }

    /// Inserts a keccak preimage and returns its hash.
    pub fn insert_keccak(&self, preimage: impl Into<Bytes>) -> B256 {
        let preimage = preimage.into();
        let hash = keccak256(&preimage);
        self.preimages.write().insert((PreimageType::Keccak256, hash), preimage);
        hash
    }

    /// Inserts the recorded keccak preimages.
    pub fn extend_keccak(
        &self,
        preimages: impl IntoIterator<Item = (B256, Vec<u8>)>,
    ) -> ProviderResult<()> {
        for (hash, preimage) in preimages {
            self.insert(PreimageType::Keccak256, hash, preimage.into())?;
        }
        Ok(())
    }

    /// Returns the number of preimages.
    pub fn len(&self) -> usize {
        self.preimages.read().len()
    }

    /// Returns true if no preimage is known.
    pub fn is_empty(&self) -> bool {
        self.preimages.read().is_empty()
    }
}

#[async_trait::async_trait]
impl PreimageResolver for MemoryPreimageResolver {
    async fn resolve_typed_preimage(&self, ty: PreimageType, hash: B256) -> ProviderResult<Bytes> {
        self.preimages
            .read()
            .get(&(ty, hash))
            .cloned()
            .ok_or(ProviderError::MissingPreimage { ty, hash })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_keccak_preimages_are_verified() -> eyre::Result<()> {
        // Given
        let resolver = MemoryPreimageResolver::default();
        let hash = resolver.insert_keccak(b"foobar".to_vec());

        // Then
        assert_eq!(resolver.resolve_keccak(hash).await?, Bytes::from_static(b"foobar"));
        assert!(matches!(
            resolver.insert(PreimageType::Keccak256, B256::ZERO, Bytes::from_static(b"x")),
            Err(ProviderError::PreimageHashMismatch(_))
        ));
        assert!(matches!(
            resolver.resolve_typed_preimage(PreimageType::EthVersionedHash, hash).await,
            Err(ProviderError::MissingPreimage { ty: PreimageType::EthVersionedHash, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_preimage_type_from_u8() {
        assert_eq!(PreimageType::try_from(2), Ok(PreimageType::EthVersionedHash));
        assert_eq!(PreimageType::try_from(3), Err(3));
    }
}
