//! The replay data source.
//!
//! Every lookup is a traversal of a content addressed structure, each step resolving a hash to
//! its preimage through a [`PreimageResolver`]. Given the preimages recorded by a live node, the
//! replay readers return the same objects as the live backend.

mod blob;
pub use blob::ReplayBlobProvider;

mod delayed;
pub use delayed::ReplayDelayedMessageReader;

mod merkle;
pub use merkle::merkle_leaf;

mod message;
pub use message::ReplayMessageReader;

mod preimage;
pub use preimage::{MemoryPreimageResolver, PreimageResolver, PreimageType};

mod record;
pub use record::{
    record_accumulator_preimages, record_block_preimages, record_delayed_message_preimages,
    record_message_preimages, trie_preimages, Preimages,
};

mod source;
pub use source::ReplayDataSource;

mod trie;
pub use trie::trie_get;
