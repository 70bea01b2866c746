//! Decoding of sequencer batches into segments.

pub mod decoding;
pub use decoding::{
    blob::{decode_blobs, encode_blobs, BlobSliceIter},
    message::{
        advance_segment, compress_brotli, decode_segments, decompress_brotli, encode_segments,
        segment, split_sequencer_message, BatchPayload, SegmentKind, SequencerMessage,
        SequencerMessageHeader, BROTLI_MESSAGE_HEADER_BYTE, DAS_MESSAGE_HEADER_FLAG,
        MAX_DECOMPRESSED_LEN, MAX_L2_MESSAGE_SIZE, MAX_SEGMENTS_PER_SEQUENCER_MESSAGE,
    },
};

pub use error::DecodingError;
mod error;
