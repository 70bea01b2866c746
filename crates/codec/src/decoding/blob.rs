use crate::error::DecodingError;
use alloy_eips::eip4844::{Blob, BYTES_PER_BLOB};
use alloy_primitives::Bytes;
use alloy_rlp::{Decodable, Encodable};
use core::slice::Iter;
use std::vec::Vec;

/// The usable bytes of a field element.
const USABLE_BYTES_PER_FIELD_ELEMENT: usize = 31;

/// The number of field elements in a blob.
const FIELD_ELEMENTS_PER_BLOB: usize = BYTES_PER_BLOB / 32;

/// An iterator over a blob. The structure implements the iterator trait and will skip a byte every
/// 32 bytes. This byte is wasted due to the use of 32 bytes per field element in the blob,
/// but every field element needing to be smaller than the BLS modulus.
#[derive(Debug, Clone)]
pub struct BlobSliceIter<'a> {
    iterator: Iter<'a, u8>,
    count: usize,
}

impl<'a> BlobSliceIter<'a> {
    /// Returns a [`BlobSliceIter`] from the provided iterator.
    pub fn from_blob_slice(blob: &'a [u8]) -> BlobSliceIter<'a> {
        Self { iterator: blob.iter(), count: 0 }
    }
}

impl<'a> Iterator for BlobSliceIter<'a> {
    type Item = &'a u8;

    fn next(&mut self) -> Option<Self::Item> {
        if self.count % 32 == 0 {
            let _ = self.iterator.next();
            self.count += 1;
        }
        self.count += 1;
        self.iterator.next()
    }
}

/// Recovers the batch payload spread over the provided blobs.
///
/// The usable bytes of every field element are concatenated and the result is read as a single
/// RLP byte string, any trailing bytes being padding.
pub fn decode_blobs(blobs: &[Blob]) -> Result<Bytes, DecodingError> {
    let raw: Vec<u8> =
        blobs.iter().flat_map(|blob| BlobSliceIter::from_blob_slice(blob.as_slice())).copied().collect();
    Ok(Bytes::decode(&mut raw.as_slice())?)
}

/// Spreads the payload over as many blobs as needed. Inverse of [`decode_blobs`].
pub fn encode_blobs(payload: &[u8]) -> Vec<Blob> {
    let mut rlp = Vec::with_capacity(payload.length());
    payload.encode(&mut rlp);

    let per_blob = FIELD_ELEMENTS_PER_BLOB * USABLE_BYTES_PER_FIELD_ELEMENT;
    rlp.chunks(per_blob)
        .map(|chunk| {
            let mut blob = Blob::ZERO;
            for (i, element) in chunk.chunks(USABLE_BYTES_PER_FIELD_ELEMENT).enumerate() {
                let offset = i * 32 + 1;
                blob[offset..offset + element.len()].copy_from_slice(element);
            }
            blob
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_skip_unused_blob_bytes() {
        let mut blob = [0u8; 64];
        blob[0] = 0xff;
        blob[1] = 1;
        blob[31] = 2;
        blob[32] = 0xff;
        blob[33] = 3;

        let val = BlobSliceIter::from_blob_slice(&blob).copied().collect::<Vec<_>>();

        assert_eq!(val.len(), 62);
        assert_eq!(val[0], 1);
        assert_eq!(val[30], 2);
        assert_eq!(val[31], 3);
        assert!(!val.contains(&0xff));
    }

    #[test]
    fn test_decode_multi_blob_payload() -> eyre::Result<()> {
        // Given
        let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let blobs = encode_blobs(&payload);

        // When
        let decoded = decode_blobs(&blobs)?;

        // Then
        assert_eq!(blobs.len(), 2);
        assert_eq!(decoded.as_ref(), payload.as_slice());
        Ok(())
    }

    #[test]
    fn test_decode_garbage_blob_fails() {
        let mut blob = Blob::ZERO;
        blob[1] = 0xc1;
        assert!(decode_blobs(&[blob]).is_err());
    }
}
