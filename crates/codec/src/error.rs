/// An error occurring during the decoding of a sequencer message.
#[derive(Debug, thiserror::Error)]
pub enum DecodingError {
    /// The message is shorter than its fixed header.
    #[error("sequencer message of {0} bytes is shorter than its header")]
    MessageTooShort(usize),
    /// The blob hashes section is not a multiple of 32 bytes.
    #[error("blob hashes section of {0} bytes is not a multiple of 32")]
    MalformedBlobHashes(usize),
    /// The blobs do not hold a valid RLP byte string.
    #[error("invalid blob payload: {0}")]
    InvalidBlobPayload(#[from] alloy_rlp::Error),
    /// The decompressed data exceeds the allowed size.
    #[error("decompressed data exceeds {0} bytes")]
    DecompressedTooLarge(usize),
    /// The brotli stream is invalid.
    #[error("brotli decompression failed: {0}")]
    Brotli(#[from] std::io::Error),
}
