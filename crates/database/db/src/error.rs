use mel_primitives::BacklogError;

/// A [`Result`] that uses [`DatabaseError`] as the error type.
pub(crate) type DatabaseResult<T> = Result<T, DatabaseError>;

/// The error type for database operations.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// A database error occurred.
    #[error("database error: {0}")]
    DatabaseError(#[from] sea_orm::DbErr),
    /// A stored value failed to decode.
    #[error("failed to decode stored value: {0}")]
    Decoding(#[from] alloy_rlp::Error),
    /// No head state is stored.
    #[error("no head mel state in database")]
    MissingHeadState,
    /// No state is stored for the parent chain block.
    #[error("no mel state for parent chain block {0}")]
    MissingState(u64),
    /// A delayed message expected in the store is missing.
    #[error("delayed message {0} not found in database")]
    MissingDelayedMessage(u64),
    /// The stored delayed message does not match the backlog witness.
    #[error("delayed message {0} not part of the mel state accumulator")]
    DelayedMessageNotInAccumulator(u64),
    /// The metadata of a batch below the head batch count is missing.
    #[error("batch metadata {0} not found in database")]
    MissingBatchMetadata(u64),
    /// The delayed message index is beyond the seen count of the state.
    #[error("delayed message {index} not seen at state with {seen} seen messages")]
    DelayedMessageNotSeen {
        /// The requested index.
        index: u64,
        /// The seen count of the state.
        seen: u64,
    },
    /// The state carries no delayed message backlog.
    #[error("mel state at block {0} has no delayed message backlog")]
    MissingBacklog(u64),
    /// Rebuilding the seen accumulator did not lead to the head root.
    #[error("rebuilt delayed messages seen root {rebuilt} does not match head root {head}")]
    SeenRootMismatch {
        /// The rebuilt root.
        rebuilt: alloy_primitives::B256,
        /// The root of the head state.
        head: alloy_primitives::B256,
    },
    /// A backlog operation failed.
    #[error(transparent)]
    Backlog(#[from] BacklogError),
}

impl DatabaseError {
    /// Returns true if stored data contradicts the accumulators of the mel state.
    pub const fn is_integrity_failure(&self) -> bool {
        matches!(self, Self::DelayedMessageNotInAccumulator(_) | Self::SeenRootMismatch { .. })
    }
}
