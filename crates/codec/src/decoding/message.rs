use crate::{error::DecodingError, from_be_bytes_slice_and_advance_buf};
use alloy_primitives::{Bytes, B256};
use alloy_rlp::{Decodable, Encodable};
use mel_primitives::{BLOB_HASHES_HEADER_FLAG, SERIALIZED_BATCH_HEADER_LEN};
use std::{
    io::{Read, Write},
    vec::Vec,
};

/// The maximum size of a decompressed batch payload.
pub const MAX_DECOMPRESSED_LEN: usize = 16 * 1024 * 1024;

/// The maximum size of a single decompressed L2 message.
pub const MAX_L2_MESSAGE_SIZE: usize = 256 * 1024;

/// The maximum number of segments in a batch.
pub const MAX_SEGMENTS_PER_SEQUENCER_MESSAGE: usize = 100 * 1024;

/// The header byte of a brotli compressed payload.
pub const BROTLI_MESSAGE_HEADER_BYTE: u8 = 0x00;

/// The header byte of a data availability certificate.
pub const DAS_MESSAGE_HEADER_FLAG: u8 = 0x80;

/// The kind of a batch segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SegmentKind {
    /// An uncompressed L2 message.
    L2Message = 0,
    /// A brotli compressed L2 message.
    L2MessageBrotli = 1,
    /// A marker to read the next delayed message.
    DelayedMessages = 2,
    /// Advances the timestamp by an RLP encoded delta.
    AdvanceTimestamp = 3,
    /// Advances the parent chain block number by an RLP encoded delta.
    AdvanceL1BlockNumber = 4,
}

impl TryFrom<u8> for SegmentKind {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::L2Message,
            1 => Self::L2MessageBrotli,
            2 => Self::DelayedMessages,
            3 => Self::AdvanceTimestamp,
            4 => Self::AdvanceL1BlockNumber,
            other => return Err(other),
        })
    }
}

/// The fixed header of a serialized batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequencerMessageHeader {
    /// Minimum timestamp.
    pub min_timestamp: u64,
    /// Maximum timestamp.
    pub max_timestamp: u64,
    /// Minimum parent chain block number.
    pub min_l1_block: u64,
    /// Maximum parent chain block number.
    pub max_l1_block: u64,
    /// Delayed messages read once the batch is applied.
    pub after_delayed_messages: u64,
}

impl SequencerMessageHeader {
    /// Returns the encoded header.
    pub fn encode(&self) -> [u8; SERIALIZED_BATCH_HEADER_LEN] {
        let mut out = [0u8; SERIALIZED_BATCH_HEADER_LEN];
        for (i, field) in [
            self.min_timestamp,
            self.max_timestamp,
            self.min_l1_block,
            self.max_l1_block,
            self.after_delayed_messages,
        ]
        .into_iter()
        .enumerate()
        {
            out[i * 8..(i + 1) * 8].copy_from_slice(&field.to_be_bytes());
        }
        out
    }
}

/// Where the segments of a batch are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchPayload<'a> {
    /// The segments are carried by the message itself.
    Inline(&'a [u8]),
    /// The segments are carried by the blobs with the provided versioned hashes.
    Blobs(Vec<B256>),
}

/// A parsed sequencer message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequencerMessage {
    /// The header of the message.
    pub header: SequencerMessageHeader,
    /// The segments of the batch.
    pub segments: Vec<Bytes>,
}

/// Splits a serialized batch into its header and payload.
pub fn split_sequencer_message(
    data: &[u8],
) -> Result<(SequencerMessageHeader, BatchPayload<'_>), DecodingError> {
    if data.len() < SERIALIZED_BATCH_HEADER_LEN {
        return Err(DecodingError::MessageTooShort(data.len()))
    }

    let buf = &mut &data[..];
    let header = SequencerMessageHeader {
        min_timestamp: from_be_bytes_slice_and_advance_buf!(u64, buf),
        max_timestamp: from_be_bytes_slice_and_advance_buf!(u64, buf),
        min_l1_block: from_be_bytes_slice_and_advance_buf!(u64, buf),
        max_l1_block: from_be_bytes_slice_and_advance_buf!(u64, buf),
        after_delayed_messages: from_be_bytes_slice_and_advance_buf!(u64, buf),
    };

    let payload = *buf;
    if payload.first() == Some(&BLOB_HASHES_HEADER_FLAG) {
        let hashes = &payload[1..];
        if hashes.len() % 32 != 0 {
            return Err(DecodingError::MalformedBlobHashes(hashes.len()))
        }
        return Ok((header, BatchPayload::Blobs(hashes.chunks(32).map(B256::from_slice).collect())))
    }

    Ok((header, BatchPayload::Inline(payload)))
}

/// Decodes the segments of a batch payload. Unsupported or corrupt payloads yield no segments.
pub fn decode_segments(payload: &[u8]) -> Vec<Bytes> {
    let Some(flag) = payload.first() else { return Vec::new() };

    match *flag {
        BROTLI_MESSAGE_HEADER_BYTE => {}
        DAS_MESSAGE_HEADER_FLAG => {
            tracing::warn!(target: "mel::codec", "data availability certificates are not supported, skipping batch payload");
            return Vec::new()
        }
        other => {
            tracing::warn!(target: "mel::codec", flag = other, "unknown sequencer message payload header byte");
            return Vec::new()
        }
    }

    let decompressed = match decompress_brotli(&payload[1..], MAX_DECOMPRESSED_LEN) {
        Ok(decompressed) => decompressed,
        Err(err) => {
            tracing::warn!(target: "mel::codec", ?err, "failed to decompress sequencer message payload");
            return Vec::new()
        }
    };

    let mut segments = Vec::new();
    let buf = &mut decompressed.as_slice();
    while !buf.is_empty() {
        if segments.len() >= MAX_SEGMENTS_PER_SEQUENCER_MESSAGE {
            tracing::warn!(target: "mel::codec", "too many segments in sequencer message");
            break
        }
        match Bytes::decode(buf) {
            Ok(segment) => segments.push(segment),
            Err(err) => {
                tracing::warn!(target: "mel::codec", ?err, "error parsing sequencer message segment");
                break
            }
        }
    }
    segments
}

/// Decompresses a brotli stream, failing if the output exceeds `max_len` bytes.
pub fn decompress_brotli(data: &[u8], max_len: usize) -> Result<Vec<u8>, DecodingError> {
    let mut out = Vec::new();
    brotli::Decompressor::new(data, 4096).take(max_len as u64 + 1).read_to_end(&mut out)?;
    if out.len() > max_len {
        return Err(DecodingError::DecompressedTooLarge(max_len))
    }
    Ok(out)
}

/// Compresses data with brotli.
pub fn compress_brotli(data: &[u8]) -> Result<Vec<u8>, DecodingError> {
    let mut writer = brotli::CompressorWriter::new(Vec::new(), 4096, 11, 22);
    writer.write_all(data)?;
    writer.flush()?;
    Ok(writer.into_inner())
}

/// Encodes a batch payload from its segments, as a batch poster would.
pub fn encode_segments(segments: &[Bytes]) -> Result<Vec<u8>, DecodingError> {
    let mut rlp = Vec::new();
    for segment in segments {
        segment.encode(&mut rlp);
    }
    let mut payload = vec![BROTLI_MESSAGE_HEADER_BYTE];
    payload.extend(compress_brotli(&rlp)?);
    Ok(payload)
}

/// Returns a segment of the provided kind.
pub fn segment(kind: SegmentKind, body: &[u8]) -> Bytes {
    let mut out = Vec::with_capacity(body.len() + 1);
    out.push(kind as u8);
    out.extend_from_slice(body);
    out.into()
}

/// Returns an advance segment of the provided kind.
pub fn advance_segment(kind: SegmentKind, delta: u64) -> Bytes {
    segment(kind, &alloy_rlp::encode(delta))
}
