//! Test utilities for the primitives.

use crate::ParentChainHeader;
use alloy_consensus::{Header, Sealable};
use alloy_primitives::{Bytes, B256};

pub use arbitrary::Arbitrary;

/// Returns an arbitrary instance of the passed type.
#[macro_export]
macro_rules! random {
    ($typ: ty) => {{
        let mut bytes = Box::new([0u8; 4 * 1024]);
        let mut rng = ::rand::rng();
        ::rand::RngCore::fill_bytes(&mut rng, bytes.as_mut_slice());
        let mut u = ::arbitrary::Unstructured::new(bytes.as_slice());
        <$typ as ::arbitrary::Arbitrary>::arbitrary(&mut u).unwrap()
    }};
}

/// Returns a header at `number` on top of `parent_hash`. The `fork` byte is written to the extra
/// data so that competing chains get distinct hashes.
pub fn header(number: u64, parent_hash: B256, fork: u8) -> ParentChainHeader {
    Header {
        number,
        parent_hash,
        timestamp: 1_700_000_000 + number * 12,
        extra_data: Bytes::from(vec![fork]),
        ..Default::default()
    }
    .seal_slow()
}

/// Returns a chain of `len` linked headers starting at `start`, the first one on top of
/// `parent_hash`.
pub fn header_chain(start: u64, len: u64, parent_hash: B256, fork: u8) -> Vec<ParentChainHeader> {
    let mut chain: Vec<ParentChainHeader> = Vec::with_capacity(len as usize);
    for number in start..start + len {
        let parent = chain.last().map(|h| h.hash()).unwrap_or(parent_hash);
        chain.push(header(number, parent, fork));
    }
    chain
}
