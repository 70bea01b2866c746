use crate::{ExtractionError, ExtractionResult};
use mel_codec::{decode_blobs, decode_segments, split_sequencer_message, BatchPayload, SequencerMessage};
use mel_primitives::ParentChainHeader;
use mel_providers::BlobProvider;

/// Parses a serialized batch into a [`SequencerMessage`], fetching its blobs when the payload is
/// made of blob versioned hashes.
///
/// A missing blob fails the parsing. A payload that cannot be decoded yields no segments.
pub(crate) async fn sequencer_message<B: BlobProvider>(
    serialized: &[u8],
    header: &ParentChainHeader,
    blobs: &B,
) -> ExtractionResult<SequencerMessage> {
    let (message_header, payload) = split_sequencer_message(serialized)?;

    let segments = match payload {
        BatchPayload::Inline(payload) => decode_segments(payload),
        BatchPayload::Blobs(hashes) => {
            let mut fetched = Vec::with_capacity(hashes.len());
            for hash in hashes {
                let blob = blobs
                    .blob(header.timestamp, hash)
                    .await?
                    .ok_or(ExtractionError::MissingBlob(hash))?;
                fetched.push(*blob);
            }
            match decode_blobs(&fetched) {
                Ok(payload) => decode_segments(&payload),
                Err(err) => {
                    tracing::warn!(target: "mel::extraction", ?err, "failed to decode blob payload");
                    Vec::new()
                }
            }
        }
    };

    Ok(SequencerMessage { header: message_header, segments })
}
