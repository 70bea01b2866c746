use crate::replay::PreimageType;
use alloy_primitives::B256;
use alloy_transport::{RpcError, TransportErrorKind};
use mel_db::DatabaseError;

/// A [`Result`] that uses [`ProviderError`] as the error type.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// An error occurring while reading parent chain data.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Parent chain RPC error.
    #[error(transparent)]
    Rpc(#[from] RpcError<TransportErrorKind>),
    /// Error at the beacon provider.
    #[error("beacon provider error: {0}")]
    BeaconProvider(#[from] reqwest::Error),
    /// Invalid timestamp for slot.
    #[error("invalid block timestamp: genesis {0}, provided {1}")]
    InvalidBlockTimestamp(u64, u64),
    /// The beacon chain configuration is unusable.
    #[error("invalid beacon chain configuration: {0}")]
    InvalidBeaconConfig(&'static str),
    /// Database error.
    #[error(transparent)]
    Database(#[from] DatabaseError),
    /// The transaction referenced by a log is unknown.
    #[error("transaction {0} not found")]
    TransactionNotFound(B256),
    /// The block is unknown.
    #[error("block {0} not found")]
    BlockNotFound(B256),
    /// A log is missing the metadata required to locate its transaction.
    #[error("log is missing its {0}")]
    MissingLogMetadata(&'static str),
    /// The delayed message has not been seen at the provided state.
    #[error("delayed message {index} not seen at state with {seen} seen messages")]
    DelayedMessageNotSeen {
        /// The requested index.
        index: u64,
        /// The seen count of the state.
        seen: u64,
    },
    /// The preimage resolver does not know the hash.
    #[error("missing {ty:?} preimage for {hash}")]
    MissingPreimage {
        /// The preimage type.
        ty: PreimageType,
        /// The requested hash.
        hash: B256,
    },
    /// A keccak preimage does not hash to its key.
    #[error("preimage does not hash to {0}")]
    PreimageHashMismatch(B256),
    /// A resolved preimage is malformed.
    #[error("malformed preimage for {hash}: {reason}")]
    MalformedPreimage {
        /// The resolved hash.
        hash: B256,
        /// What is wrong with it.
        reason: &'static str,
    },
    /// A trie node is malformed.
    #[error("invalid trie node: {0}")]
    InvalidTrieNode(&'static str),
    /// The requested accumulator leaf is out of range.
    #[error("leaf {index} out of range for accumulator of size {size}")]
    LeafOutOfRange {
        /// The requested index.
        index: u64,
        /// The accumulator size.
        size: u64,
    },
    /// RLP decoding error.
    #[error(transparent)]
    Rlp(#[from] alloy_rlp::Error),
    /// EIP-2718 envelope decoding error.
    #[error(transparent)]
    Eip2718(#[from] alloy_eips::eip2718::Eip2718Error),
}

impl ProviderError {
    /// Returns true if the source returned data that contradicts a commitment. Retrying will not
    /// help.
    pub const fn is_integrity_failure(&self) -> bool {
        match self {
            Self::PreimageHashMismatch(_) |
            Self::MalformedPreimage { .. } |
            Self::InvalidTrieNode(_) => true,
            Self::Database(err) => err.is_integrity_failure(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integrity_failures() {
        assert!(ProviderError::PreimageHashMismatch(B256::ZERO).is_integrity_failure());
        assert!(ProviderError::Database(DatabaseError::DelayedMessageNotInAccumulator(1))
            .is_integrity_failure());
        assert!(!ProviderError::Database(DatabaseError::MissingDelayedMessage(1))
            .is_integrity_failure());
        assert!(!ProviderError::MissingPreimage { ty: PreimageType::Keccak256, hash: B256::ZERO }
            .is_integrity_failure());
        assert!(!ProviderError::TransactionNotFound(B256::ZERO).is_integrity_failure());
    }
}
