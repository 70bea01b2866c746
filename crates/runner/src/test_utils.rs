//! Test utilities for the mel runner.

use crate::{MelConfig, MelRunner, MessageConsumer, RunnerResult};
use mel_db::{MelDatabase, MemoryKeyValueStore};
use mel_extraction::test_utils::TestInbox;
use mel_primitives::MessageWithMetadata;
use mel_providers::{test_utils::MockParentChain, LiveDataSource, MockBlobProvider};
use parking_lot::Mutex;
use std::{collections::BTreeMap, sync::Arc};

/// A [`MessageConsumer`] recording the pushed messages by index.
#[derive(Debug, Clone, Default)]
pub struct RecordingConsumer {
    messages: Arc<Mutex<BTreeMap<u64, MessageWithMetadata>>>,
    pushes: Arc<Mutex<Vec<u64>>>,
}

impl RecordingConsumer {
    /// Returns the recorded messages in index order.
    pub fn messages(&self) -> Vec<MessageWithMetadata> {
        self.messages.lock().values().cloned().collect()
    }

    /// Returns the first index of every non empty push, in push order.
    pub fn pushes(&self) -> Vec<u64> {
        self.pushes.lock().clone()
    }
}

#[async_trait::async_trait]
impl MessageConsumer for RecordingConsumer {
    async fn push_messages(
        &self,
        first_index: u64,
        messages: &[MessageWithMetadata],
    ) -> RunnerResult<()> {
        if messages.is_empty() {
            return Ok(())
        }
        self.pushes.lock().push(first_index);
        let mut recorded = self.messages.lock();
        // a repeated push replaces the messages above its first index.
        recorded.retain(|index, _| *index < first_index);
        recorded.extend((first_index..).zip(messages.iter().cloned()));
        Ok(())
    }
}

/// The runner used in tests, over a mock parent chain and an in memory store.
pub type TestRunner =
    MelRunner<MockParentChain, MemoryKeyValueStore, MockBlobProvider, RecordingConsumer>;

/// Returns a [`TestRunner`] reading the inbox contracts of `inbox` on `chain`, and the consumer
/// it pushes to. The database is initialized with the genesis state of `inbox` at block zero.
pub async fn test_runner(
    chain: &MockParentChain,
    inbox: &TestInbox,
    config: MelConfig,
) -> (TestRunner, RecordingConsumer) {
    let genesis = mel_providers::ParentChainClient::header_by_number(chain, 0.into())
        .await
        .expect("mock chain")
        .expect("genesis block");
    let db = MelDatabase::new(MemoryKeyValueStore::default());
    crate::initialize_state(&db, &inbox.genesis_state(&genesis)).await.expect("in memory store");

    let consumer = RecordingConsumer::default();
    let source = LiveDataSource::new(chain.clone(), &inbox.schema, 16);
    let runner = MelRunner::new(
        config,
        inbox.schema.clone(),
        db,
        source,
        inbox.blobs.clone(),
        consumer.clone(),
    );
    (runner, consumer)
}
