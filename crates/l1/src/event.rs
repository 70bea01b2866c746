use crate::abi::logs::{
    InboxMessageDelivered, InboxMessageDeliveredFromOrigin, MessageDelivered, SequencerBatchData,
    SequencerBatchDelivered,
};
use alloy_sol_types::SolEvent;

/// The kinds of inbox events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboxEventKind {
    /// A sequencer batch was delivered.
    BatchDelivered,
    /// The data of a sequencer batch, emitted separately.
    BatchData,
    /// A delayed message was delivered to the bridge.
    MessageDelivered,
    /// The payload of a delayed message, carried inline.
    InboxMessageDelivered,
    /// The payload of a delayed message, carried in the calldata of the transaction.
    InboxMessageDeliveredFromOrigin,
}

impl InboxEventKind {
    /// All the event kinds.
    pub const ALL: [Self; 5] = [
        Self::BatchDelivered,
        Self::BatchData,
        Self::MessageDelivered,
        Self::InboxMessageDelivered,
        Self::InboxMessageDeliveredFromOrigin,
    ];

    /// Returns the event signature.
    pub const fn signature(&self) -> &'static str {
        match self {
            Self::BatchDelivered => SequencerBatchDelivered::SIGNATURE,
            Self::BatchData => SequencerBatchData::SIGNATURE,
            Self::MessageDelivered => MessageDelivered::SIGNATURE,
            Self::InboxMessageDelivered => InboxMessageDelivered::SIGNATURE,
            Self::InboxMessageDeliveredFromOrigin => InboxMessageDeliveredFromOrigin::SIGNATURE,
        }
    }
}

/// A decoded inbox event.
#[derive(Debug, PartialEq, Eq, derive_more::From)]
pub enum InboxEvent {
    /// A sequencer batch was delivered.
    BatchDelivered(SequencerBatchDelivered),
    /// The data of a sequencer batch.
    BatchData(SequencerBatchData),
    /// A delayed message was delivered.
    MessageDelivered(MessageDelivered),
    /// The payload of a delayed message.
    InboxMessageDelivered(InboxMessageDelivered),
    /// The payload of a delayed message is in the transaction calldata.
    InboxMessageDeliveredFromOrigin(InboxMessageDeliveredFromOrigin),
}

impl InboxEvent {
    /// Returns the kind of the event.
    pub const fn kind(&self) -> InboxEventKind {
        match self {
            Self::BatchDelivered(_) => InboxEventKind::BatchDelivered,
            Self::BatchData(_) => InboxEventKind::BatchData,
            Self::MessageDelivered(_) => InboxEventKind::MessageDelivered,
            Self::InboxMessageDelivered(_) => InboxEventKind::InboxMessageDelivered,
            Self::InboxMessageDeliveredFromOrigin(_) => {
                InboxEventKind::InboxMessageDeliveredFromOrigin
            }
        }
    }
}
