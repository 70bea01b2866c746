//! The downstream consumer of extracted messages.

use crate::{constants::MESSAGE_CHANNEL_CAPACITY, RunnerError, RunnerResult};
use mel_primitives::MessageWithMetadata;
use tokio::sync::mpsc;

/// An instance of the trait ingests the messages extracted by the [`crate::MelRunner`]. Messages
/// are pushed in contiguous index order, a push may repeat messages already ingested when the
/// runner retries a step.
#[async_trait::async_trait]
#[auto_impl::auto_impl(Arc, &)]
pub trait MessageConsumer: Send + Sync {
    /// Ingests `messages`, the first one being at `first_index`.
    async fn push_messages(
        &self,
        first_index: u64,
        messages: &[MessageWithMetadata],
    ) -> RunnerResult<()>;
}

/// A batch of messages forwarded by the [`ChannelConsumer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBatch {
    /// The index of the first message.
    pub first_index: u64,
    /// The messages.
    pub messages: Vec<MessageWithMetadata>,
}

/// A [`MessageConsumer`] forwarding messages over a bounded channel.
#[derive(Debug, Clone)]
pub struct ChannelConsumer {
    sender: mpsc::Sender<MessageBatch>,
}

impl ChannelConsumer {
    /// Returns a new [`ChannelConsumer`] and the receiving half of its channel.
    pub fn new() -> (Self, mpsc::Receiver<MessageBatch>) {
        let (sender, receiver) = mpsc::channel(MESSAGE_CHANNEL_CAPACITY);
        (Self { sender }, receiver)
    }
}

#[async_trait::async_trait]
impl MessageConsumer for ChannelConsumer {
    async fn push_messages(
        &self,
        first_index: u64,
        messages: &[MessageWithMetadata],
    ) -> RunnerResult<()> {
        if messages.is_empty() {
            return Ok(())
        }
        self.sender
            .send(MessageBatch { first_index, messages: messages.to_vec() })
            .await
            .map_err(|_| RunnerError::Consumer("message channel closed".to_string()))
    }
}
