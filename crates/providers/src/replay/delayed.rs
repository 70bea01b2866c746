use crate::{
    replay::{merkle_leaf, PreimageResolver},
    DelayedMessageDatabase, ProviderError, ProviderResult,
};
use alloy_rlp::Decodable;
use mel_primitives::{DelayedInboxMessage, L1IncomingMessage, L1IncomingMessageHeader, MelState};

/// Reads delayed messages by walking the seen delayed message accumulator of a [`MelState`].
#[derive(Debug, Clone)]
pub struct ReplayDelayedMessageReader<R> {
    resolver: R,
}

impl<R> ReplayDelayedMessageReader<R> {
    /// Returns a new [`ReplayDelayedMessageReader`].
    pub const fn new(resolver: R) -> Self {
        Self { resolver }
    }
}

#[async_trait::async_trait]
impl<R: PreimageResolver> DelayedMessageDatabase for ReplayDelayedMessageReader<R> {
    async fn read_delayed_message(
        &self,
        state: &MelState,
        index: u64,
    ) -> ProviderResult<Option<DelayedInboxMessage>> {
        let seen = state.delayed_messages_seen;
        if index >= seen {
            return Err(ProviderError::DelayedMessageNotSeen { index, seen })
        }

        let item =
            merkle_leaf(&self.resolver, state.delayed_messages_seen_root, seen, index).await?;
        let (before_inbox_acc, content_hash) = self.resolver.resolve_keccak_pair(item).await?;
        let (header_hash, payload_hash) = self.resolver.resolve_keccak_pair(content_hash).await?;

        let header = self.resolver.resolve_keccak(header_hash).await?;
        let header = L1IncomingMessageHeader::decode(&mut header.as_ref())?;
        let l2_msg = self.resolver.resolve_keccak(payload_hash).await?;

        let message = DelayedInboxMessage {
            before_inbox_acc,
            message: L1IncomingMessage { header, l2_msg, batch_gas_cost: None },
        };
        if message.after_inbox_acc() != item {
            return Err(ProviderError::PreimageHashMismatch(item))
        }

        tracing::trace!(target: "mel::replay", index, "read delayed message");
        Ok(Some(message))
    }
}
