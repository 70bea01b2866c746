//! An append-only Merkle accumulator.
//!
//! Leaves are `keccak(item)`. Complete subtrees are kept as one partial per level, and the root is
//! the balanced binary tree of depth `ceil(log2(size))` where missing right siblings are the zero
//! hash.

use alloy_primitives::{keccak256, B256};
use std::vec::Vec;

/// Returns `keccak(left ‖ right)`.
pub fn hash_pair(left: B256, right: B256) -> B256 {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left.as_slice());
    buf[32..].copy_from_slice(right.as_slice());
    keccak256(buf)
}

/// Returns the depth of a balanced tree holding `size` leaves.
pub const fn tree_depth(size: u64) -> u32 {
    if size <= 1 {
        0
    } else {
        u64::BITS - (size - 1).leading_zeros()
    }
}

/// An incremental Merkle accumulator, retaining only one partial per level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MerkleAccumulator {
    size: u64,
    partials: Vec<B256>,
}

impl MerkleAccumulator {
    /// Returns an empty accumulator.
    pub const fn new() -> Self {
        Self { size: 0, partials: Vec::new() }
    }

    /// Restores an accumulator from its leaf count and its partials.
    pub const fn from_partials(size: u64, partials: Vec<B256>) -> Self {
        Self { size, partials }
    }

    /// Returns the number of appended items.
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Returns the partials, lowest level first.
    pub fn partials(&self) -> &[B256] {
        &self.partials
    }

    /// Appends an item to the accumulator.
    pub fn append(&mut self, item: B256) {
        self.size += 1;
        let mut so_far = keccak256(item);
        for partial in &mut self.partials {
            if partial.is_zero() {
                *partial = so_far;
                return
            }
            so_far = hash_pair(*partial, so_far);
            *partial = B256::ZERO;
        }
        self.partials.push(so_far);
    }

    /// Computes the root of the accumulator. The root of an empty accumulator is the zero hash.
    pub fn root(&self) -> B256 {
        if self.size == 0 {
            return B256::ZERO
        }

        let mut hash_so_far: Option<B256> = None;
        let mut capacity_in_hash = 0u64;
        let mut capacity = 1u64;
        for partial in &self.partials {
            if !partial.is_zero() {
                match hash_so_far {
                    None => {
                        hash_so_far = Some(*partial);
                        capacity_in_hash = capacity;
                    }
                    Some(mut hash) => {
                        while capacity_in_hash < capacity {
                            hash = hash_pair(hash, B256::ZERO);
                            capacity_in_hash *= 2;
                        }
                        hash_so_far = Some(hash_pair(*partial, hash));
                        capacity_in_hash = 2 * capacity;
                    }
                }
            }
            capacity = capacity.saturating_mul(2);
        }
        hash_so_far.unwrap_or_default()
    }
}

/// Builds the balanced tree over `items` and returns its root along with every `(hash, preimage)`
/// pair needed to walk from the root down to any item.
///
/// The returned root always equals the [`MerkleAccumulator::root`] of the same items.
pub fn merkle_tree_preimages(items: &[B256]) -> (B256, Vec<(B256, Vec<u8>)>) {
    let mut preimages = Vec::with_capacity(items.len() * 2);
    if items.is_empty() {
        return (B256::ZERO, preimages)
    }

    let mut level: Vec<B256> = items
        .iter()
        .map(|item| {
            let leaf = keccak256(item);
            preimages.push((leaf, item.to_vec()));
            leaf
        })
        .collect();

    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let left = pair[0];
                let right = pair.get(1).copied().unwrap_or_default();
                let mut preimage = Vec::with_capacity(64);
                preimage.extend_from_slice(left.as_slice());
                preimage.extend_from_slice(right.as_slice());
                let node = keccak256(&preimage);
                preimages.push((node, preimage));
                node
            })
            .collect();
    }

    (level[0], preimages)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(count: u64) -> Vec<B256> {
        (0..count).map(|i| keccak256(i.to_be_bytes())).collect()
    }

    #[test]
    fn test_tree_depth() {
        assert_eq!(tree_depth(0), 0);
        assert_eq!(tree_depth(1), 0);
        assert_eq!(tree_depth(2), 1);
        assert_eq!(tree_depth(3), 2);
        assert_eq!(tree_depth(4), 2);
        assert_eq!(tree_depth(5), 3);
        assert_eq!(tree_depth(1 << 20), 20);
        assert_eq!(tree_depth((1 << 20) + 1), 21);
    }

    #[test]
    fn test_empty_root_is_zero() {
        assert_eq!(MerkleAccumulator::new().root(), B256::ZERO);
    }

    #[test]
    fn test_single_item_root_is_leaf() {
        let item = B256::repeat_byte(7);
        let mut acc = MerkleAccumulator::new();
        acc.append(item);
        assert_eq!(acc.root(), keccak256(item));
    }

    #[test]
    fn test_accumulator_root_matches_balanced_tree() {
        for count in 1..=17u64 {
            // Given
            let items = items(count);
            let mut acc = MerkleAccumulator::new();

            // When
            items.iter().for_each(|item| acc.append(*item));
            let (root, _) = merkle_tree_preimages(&items);

            // Then
            assert_eq!(acc.root(), root, "root mismatch for {count} items");
            assert_eq!(acc.size(), count);
        }
    }

    #[test]
    fn test_restore_from_partials_continues_appending() {
        // Given
        let items = items(11);
        let mut full = MerkleAccumulator::new();
        items.iter().for_each(|item| full.append(*item));

        let mut first = MerkleAccumulator::new();
        items[..6].iter().for_each(|item| first.append(*item));

        // When
        let mut restored = MerkleAccumulator::from_partials(6, first.partials().to_vec());
        items[6..].iter().for_each(|item| restored.append(*item));

        // Then
        assert_eq!(restored, full);
        assert_eq!(restored.root(), full.root());
    }
}
