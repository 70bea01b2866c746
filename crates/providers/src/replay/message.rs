use crate::{
    replay::{merkle_leaf, PreimageResolver},
    ProviderError, ProviderResult,
};
use alloy_rlp::Decodable;
use mel_primitives::{MelState, MessageWithMetadata};

/// Reads extracted messages back from the message accumulator of a [`MelState`].
#[derive(Debug, Clone)]
pub struct ReplayMessageReader<R> {
    resolver: R,
}

impl<R: PreimageResolver> ReplayMessageReader<R> {
    /// Returns a new [`ReplayMessageReader`].
    pub const fn new(resolver: R) -> Self {
        Self { resolver }
    }

    /// Returns the message at `index`.
    pub async fn read_message(
        &self,
        state: &MelState,
        index: u64,
    ) -> ProviderResult<MessageWithMetadata> {
        let item =
            merkle_leaf(&self.resolver, state.message_accumulator_root, state.msg_count, index)
                .await?;
        let encoded = self.resolver.resolve_keccak(item).await?;
        let message = MessageWithMetadata::decode(&mut encoded.as_ref())?;
        if message.hash() != item {
            return Err(ProviderError::PreimageHashMismatch(item))
        }
        Ok(message)
    }
}
