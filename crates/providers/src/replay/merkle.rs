use crate::{replay::PreimageResolver, ProviderError, ProviderResult};
use alloy_primitives::B256;
use mel_primitives::accumulator::tree_depth;

/// Returns the item at `index` of the balanced Merkle tree with `size` leaves rooted at `root`.
///
/// Every inner node resolves to `left ‖ right`, and the leaf resolves to the 32 byte item.
pub async fn merkle_leaf<R: PreimageResolver + ?Sized>(
    resolver: &R,
    root: B256,
    size: u64,
    index: u64,
) -> ProviderResult<B256> {
    if index >= size {
        return Err(ProviderError::LeafOutOfRange { index, size })
    }

    let mut node = root;
    for level in (0..tree_depth(size)).rev() {
        let (left, right) = resolver.resolve_keccak_pair(node).await?;
        node = if (index >> level) & 1 == 0 { left } else { right };
    }

    let item = resolver.resolve_keccak(node).await?;
    if item.len() != 32 {
        return Err(ProviderError::MalformedPreimage { hash: node, reason: "expected 32 byte leaf" })
    }
    Ok(B256::from_slice(&item))
}
