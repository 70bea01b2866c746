//! Data access for the message extraction layer.
//!
//! Extraction reads parent chain data through the capability traits of this crate. Two backends
//! implement them: a live backend over RPC and the database, and a replay backend resolving every
//! object from content addressed preimages.

mod blob;
pub use blob::{BeaconClientProvider, BlobProvider, MockBlobProvider};

mod delayed;
pub use delayed::DelayedMessageDatabase;

mod error;
pub use error::{ProviderError, ProviderResult};

mod live;
pub use live::{LiveDataSource, ParentChainClient, RpcParentChain};

mod logs;
pub use logs::{block_logs, LogsFetcher, TransactionFetcher};

pub mod replay;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
