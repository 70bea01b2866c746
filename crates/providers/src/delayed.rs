use crate::{ProviderError, ProviderResult};
use mel_db::{DatabaseError, KeyValueStore, MelDatabase};
use mel_primitives::{DelayedInboxMessage, MelState};

/// An instance of the trait can read the delayed messages seen by a [`MelState`].
#[async_trait::async_trait]
#[auto_impl::auto_impl(Arc, &)]
pub trait DelayedMessageDatabase: Send + Sync {
    /// Returns the delayed message at `index`, authenticated against the state. Returns `None` if
    /// the message is unknown to the source.
    async fn read_delayed_message(
        &self,
        state: &MelState,
        index: u64,
    ) -> ProviderResult<Option<DelayedInboxMessage>>;
}

#[async_trait::async_trait]
impl<S: KeyValueStore> DelayedMessageDatabase for MelDatabase<S> {
    async fn read_delayed_message(
        &self,
        state: &MelState,
        index: u64,
    ) -> ProviderResult<Option<DelayedInboxMessage>> {
        match Self::read_delayed_message(self, state, index).await {
            Ok(message) => Ok(message),
            Err(DatabaseError::DelayedMessageNotSeen { index, seen }) => {
                Err(ProviderError::DelayedMessageNotSeen { index, seen })
            }
            Err(err) => Err(err.into()),
        }
    }
}
