use alloy_consensus::{Header, Sealed};
use alloy_primitives::B256;

/// A parent chain header along with its hash.
pub type ParentChainHeader = Sealed<Header>;

/// Information about a parent chain block.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, derive_more::Display)]
#[display("BlockInfo {{ number: {number}, hash: {hash} }}")]
pub struct BlockInfo {
    /// The block number.
    pub number: u64,
    /// The block hash.
    pub hash: B256,
}

impl BlockInfo {
    /// Returns a new instance of [`BlockInfo`].
    pub const fn new(number: u64, hash: B256) -> Self {
        Self { number, hash }
    }
}

impl From<&ParentChainHeader> for BlockInfo {
    fn from(value: &ParentChainHeader) -> Self {
        Self { number: value.number, hash: value.hash() }
    }
}

#[cfg(feature = "arbitrary")]
impl arbitrary::Arbitrary<'_> for BlockInfo {
    fn arbitrary(u: &mut arbitrary::Unstructured<'_>) -> arbitrary::Result<Self> {
        let number = u.int_in_range(0..=u32::MAX)?;
        let hash = B256::arbitrary(u)?;
        Ok(Self { number: number as u64, hash })
    }
}
