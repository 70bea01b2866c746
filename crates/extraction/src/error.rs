use alloy_primitives::B256;
use mel_codec::DecodingError;
use mel_l1::EventDecodeError;
use mel_primitives::{BacklogError, MessageError};
use mel_providers::ProviderError;

/// A [`Result`] that uses [`ExtractionError`] as the error type.
pub type ExtractionResult<T> = Result<T, ExtractionError>;

/// An error occurring while extracting messages from a parent chain block.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// The block does not build on the block of the state.
    #[error("invalid parent chain block: expected parent {expected}, got {got}")]
    ParentHashMismatch {
        /// The block hash recorded in the state.
        expected: B256,
        /// The parent hash of the block.
        got: B256,
    },
    /// The sequence numbers of the batches are not consecutive.
    #[error("sequencer batches out of order: expected {expected}, got {got}")]
    BatchesOutOfOrder {
        /// The expected sequence number.
        expected: u64,
        /// The sequence number found.
        got: u64,
    },
    /// The batch carries an unknown data location tag.
    #[error("invalid data location {location} for batch {sequence_number}")]
    InvalidDataLocation {
        /// The sequence number of the batch.
        sequence_number: u64,
        /// The tag found.
        location: u8,
    },
    /// The call data of the posting transaction is not a known batch posting call.
    #[error("transaction {0} is not a sequencer batch posting call")]
    InvalidBatchCalldata(B256),
    /// The separate batch data event is absent from the posting transaction.
    #[error("batch data event for batch {0} not found")]
    MissingBatchData(u64),
    /// A blob batch was posted by a transaction without blobs.
    #[error("blob batch transaction {0} has no blobs")]
    MissingBlobHashes(B256),
    /// A blob is not available.
    #[error("blob {0} not found")]
    MissingBlob(B256),
    /// The payload of a delayed message was not emitted in the block.
    #[error("message {0} data not found")]
    MissingDelayedMessageData(u64),
    /// The payload of a delayed message does not match its declared hash.
    #[error("found message {index} data with mismatched hash: expected {expected}, got {got}")]
    DelayedMessageHashMismatch {
        /// The delayed message index.
        index: u64,
        /// The declared payload hash.
        expected: B256,
        /// The hash of the payload found.
        got: B256,
    },
    /// The delayed messages of the block do not extend the seen count.
    #[error("delayed messages out of order: expected index {expected}, got {got}")]
    DelayedMessagesOutOfOrder {
        /// The expected index.
        expected: u64,
        /// The index found.
        got: u64,
    },
    /// The origin transaction of a delayed message is not a `sendL2MessageFromOrigin` call.
    #[error("transaction {0} is not a sendL2MessageFromOrigin call")]
    InvalidOriginCalldata(B256),
    /// The block holds a different number of batch posting reports and batches.
    #[error("batch posting reports {reports} do not match the number of batches {batches}")]
    ReportCountMismatch {
        /// The number of reports.
        reports: usize,
        /// The number of batches.
        batches: usize,
    },
    /// The batch posting report does not commit to the serialized batch.
    #[error("batch data hash incorrect {got} (wanted {expected} for batch {sequence_number})")]
    BatchDataHashMismatch {
        /// The sequence number of the batch.
        sequence_number: u64,
        /// The hash declared by the report.
        expected: B256,
        /// The hash of the serialized batch.
        got: B256,
    },
    /// The batch commits to a delayed message that does not exist.
    #[error("no more delayed messages in queue, delayed messages read {0}")]
    MissingDelayedMessage(u64),
    /// A batch posting report is malformed.
    #[error("failed to parse batch posting report: {0}")]
    InvalidReport(#[from] MessageError),
    /// An inbox event could not be decoded.
    #[error(transparent)]
    EventDecode(#[from] EventDecodeError),
    /// A sequencer message could not be decoded.
    #[error(transparent)]
    Decoding(#[from] DecodingError),
    /// The delayed message backlog rejected an entry.
    #[error(transparent)]
    Backlog(#[from] BacklogError),
    /// A data source failed.
    #[error(transparent)]
    Provider(ProviderError),
    /// A data source returned data that does not match its commitment.
    #[error("data source integrity failure: {0}")]
    DataIntegrity(ProviderError),
}

impl From<ProviderError> for ExtractionError {
    fn from(err: ProviderError) -> Self {
        if err.is_integrity_failure() {
            Self::DataIntegrity(err)
        } else {
            Self::Provider(err)
        }
    }
}

impl ExtractionError {
    /// Returns true if the error signals a parent chain reorg rather than a failure.
    pub const fn is_reorg(&self) -> bool {
        matches!(self, Self::ParentHashMismatch { .. })
    }

    /// Returns true if the error is caused by the data source and may resolve on retry.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider(_) | Self::MissingBlob(_))
    }
}
