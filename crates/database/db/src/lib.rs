//! A library responsible for persisting the message extraction state.

mod db;
pub use db::SqlKeyValueStore;

mod error;
pub use error::DatabaseError;

mod mel;
pub use mel::MelDatabase;

mod models;

mod store;
pub use store::{KeyValueStore, MemoryKeyValueStore, WriteBatch};

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
