use mel_db::DatabaseError;
use mel_extraction::ExtractionError;
use mel_primitives::BacklogError;
use mel_providers::ProviderError;

/// A [`Result`] that uses [`RunnerError`] as the error type.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// An error occurring during a step of the [`crate::MelRunner`].
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The configuration is invalid.
    #[error("invalid mel configuration: {0}")]
    InvalidConfig(String),
    /// The extraction of a parent chain block failed.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    /// A database operation failed.
    #[error(transparent)]
    Database(#[from] DatabaseError),
    /// A data source failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// A backlog operation failed.
    #[error(transparent)]
    Backlog(#[from] BacklogError),
    /// The consumer rejected the messages.
    #[error("message consumer error: {0}")]
    Consumer(String),
    /// A reorg rewound the state before the first parent chain block.
    #[error("cannot reorg the mel state past the parent chain genesis")]
    ReorgPastGenesis,
    /// The state of the common ancestor of a reorg is not persisted.
    #[error("no mel state persisted for reorg target block {0}")]
    MissingReorgTarget(u64),
}
