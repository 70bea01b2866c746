//! Expansion of the segments of a sequencer message into individual messages.

use crate::{ExtractionError, ExtractionResult};
use alloy_primitives::Bytes;
use alloy_rlp::Decodable;
use mel_codec::{decompress_brotli, SegmentKind, SequencerMessage, MAX_L2_MESSAGE_SIZE};
use mel_primitives::{L1IncomingMessage, MelState, MessageWithMetadata};
use mel_providers::DelayedMessageDatabase;

/// Expands the segments of the sequencer message into messages.
///
/// Advance segments move a running `(timestamp, block number)` cursor, which is bounded by the
/// message header for every emitted message. Each L2 message or delayed message segment yields
/// one message. Once the segments are exhausted, virtual delayed message segments are read until
/// `delayed_messages_read` reaches the delayed count committed by the batch. Delayed messages are
/// read from `delayed` at `state`, and `delayed_messages_read` is advanced accordingly.
pub async fn messages_from_segments<D: DelayedMessageDatabase>(
    message: &SequencerMessage,
    state: &MelState,
    delayed_messages_read: &mut u64,
    delayed: &D,
) -> ExtractionResult<Vec<MessageWithMetadata>> {
    let header = &message.header;
    let segments = message.segments.as_slice();
    let after_delayed = header.after_delayed_messages;

    let mut cursor = 0;
    let mut timestamp = 0u64;
    let mut block_number = 0u64;
    let mut messages = Vec::new();

    while !is_exhausted(&segments[cursor..], *delayed_messages_read, after_delayed) {
        while let Some(segment) = segments.get(cursor) {
            let Some((kind, body)) = segment.split_first() else {
                cursor += 1;
                continue
            };
            let kind = SegmentKind::try_from(*kind);
            if !matches!(kind, Ok(SegmentKind::AdvanceTimestamp | SegmentKind::AdvanceL1BlockNumber))
            {
                break
            }
            match u64::decode(&mut &body[..]) {
                Ok(delta) if kind == Ok(SegmentKind::AdvanceTimestamp) => {
                    timestamp = timestamp.saturating_add(delta)
                }
                Ok(delta) => block_number = block_number.saturating_add(delta),
                Err(err) => {
                    tracing::warn!(target: "mel::extraction", ?err, cursor, "error parsing sequencer advancing segment")
                }
            }
            cursor += 1;
        }

        let timestamp = bounded(timestamp, header.min_timestamp, header.max_timestamp);
        let block_number = bounded(block_number, header.min_l1_block, header.max_l1_block);

        let (kind, body, is_virtual) = match segments.get(cursor) {
            Some(segment) => {
                cursor += 1;
                (SegmentKind::try_from(segment[0]), segment.slice(1..), false)
            }
            None => {
                tracing::debug!(target: "mel::extraction", read = *delayed_messages_read, "reading virtual delayed message segment");
                (Ok(SegmentKind::DelayedMessages), Bytes::new(), true)
            }
        };

        let next = match kind {
            Ok(SegmentKind::L2Message) => MessageWithMetadata {
                message: L1IncomingMessage::l2_message(block_number, timestamp, body),
                delayed_messages_read: *delayed_messages_read,
            },
            Ok(SegmentKind::L2MessageBrotli) => {
                let message = match decompress_brotli(&body, MAX_L2_MESSAGE_SIZE) {
                    Ok(decompressed) => {
                        L1IncomingMessage::l2_message(block_number, timestamp, decompressed.into())
                    }
                    Err(err) => {
                        tracing::info!(target: "mel::extraction", ?err, "dropping compressed message");
                        L1IncomingMessage::invalid(block_number, timestamp)
                    }
                };
                MessageWithMetadata { message, delayed_messages_read: *delayed_messages_read }
            }
            Ok(SegmentKind::DelayedMessages) if *delayed_messages_read >= after_delayed => {
                if !is_virtual {
                    tracing::warn!(target: "mel::extraction", read = *delayed_messages_read, after_delayed, "attempt to read past batch delayed message count");
                }
                MessageWithMetadata {
                    message: L1IncomingMessage::invalid(block_number, timestamp),
                    delayed_messages_read: after_delayed,
                }
            }
            Ok(SegmentKind::DelayedMessages) => {
                let index = *delayed_messages_read;
                let Some(delayed) = delayed.read_delayed_message(state, index).await? else {
                    tracing::error!(target: "mel::extraction", read = index, "no more delayed messages in queue");
                    return Err(ExtractionError::MissingDelayedMessage(index))
                };
                *delayed_messages_read += 1;
                MessageWithMetadata {
                    message: delayed.message,
                    delayed_messages_read: *delayed_messages_read,
                }
            }
            // advance segments are consumed above.
            Ok(SegmentKind::AdvanceTimestamp | SegmentKind::AdvanceL1BlockNumber) | Err(_) => {
                tracing::error!(target: "mel::extraction", cursor, kind = ?kind, "bad sequencer message segment kind");
                MessageWithMetadata {
                    message: L1IncomingMessage::invalid(block_number, timestamp),
                    delayed_messages_read: *delayed_messages_read,
                }
            }
        };
        messages.push(next);
    }

    Ok(messages)
}

/// Returns true once every delayed message of the batch is read and no remaining segment can
/// produce a message.
fn is_exhausted(remaining: &[Bytes], delayed_messages_read: u64, after_delayed: u64) -> bool {
    if delayed_messages_read < after_delayed {
        return false
    }
    !remaining.iter().any(|segment| {
        matches!(
            segment.first().map(|kind| SegmentKind::try_from(*kind)),
            Some(Ok(
                SegmentKind::L2Message | SegmentKind::L2MessageBrotli | SegmentKind::DelayedMessages
            ))
        )
    })
}

/// Bounds `value` to `[min, max]`. The bounds come from the batch and are not validated, so
/// `min` may exceed `max`.
#[allow(clippy::manual_clamp)]
const fn bounded(value: u64, min: u64, max: u64) -> u64 {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}
