//! Primitive types for the message extraction layer.

pub mod accumulator;
pub use accumulator::{merkle_tree_preimages, MerkleAccumulator};

mod backlog;
pub use backlog::{
    BacklogError, BacklogResult, DelayedMessageBacklog,
    DelayedMessageBacklogEntry, FinalizedReadOracle,
};

mod batch;
pub use batch::{
    batch_data_hash, legacy_batch_gas_cost, BatchDataLocation, BatchMetadata,
    SequencerInboxBatch, TimeBounds, BLOB_HASHES_HEADER_FLAG, SERIALIZED_BATCH_HEADER_LEN,
};

mod block;
pub use block::{BlockInfo, ParentChainHeader};

mod message;
pub use message::{
    kind, BatchPostingReport, DelayedInboxMessage, L1IncomingMessage, L1IncomingMessageHeader,
    MessageError, MessageWithMetadata, BATCH_POSTER_ADDRESS,
};

mod state;
pub use state::{MelState, MEL_STATE_VERSION};

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
