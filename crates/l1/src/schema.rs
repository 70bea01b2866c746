use crate::{
    abi::logs::{
        InboxMessageDelivered, InboxMessageDeliveredFromOrigin, MessageDelivered,
        SequencerBatchData, SequencerBatchDelivered,
    },
    InboxEvent, InboxEventKind,
};
use alloy_primitives::{keccak256, Log, B256};
use alloy_sol_types::SolEvent;

/// An error constructing the [`EventSchema`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SchemaError {
    /// Two events share a topic.
    #[error("topic {topic} is shared by {first:?} and {second:?}")]
    DuplicateTopic {
        /// The shared topic.
        topic: B256,
        /// The first event.
        first: InboxEventKind,
        /// The second event.
        second: InboxEventKind,
    },
    /// The topic of an event does not match its signature.
    #[error("topic of {0:?} does not match its signature")]
    SignatureMismatch(InboxEventKind),
}

/// An error decoding an inbox event.
#[derive(Debug, thiserror::Error)]
#[error("failed to decode {kind:?} log: {source}")]
pub struct EventDecodeError {
    /// The event kind matched by topic.
    pub kind: InboxEventKind,
    /// The decoding error.
    #[source]
    pub source: alloy_sol_types::Error,
}

/// The fixed topic table used to select and decode inbox events.
#[derive(Debug, Clone)]
pub struct EventSchema {
    table: [(B256, InboxEventKind); 5],
}

impl EventSchema {
    /// Builds the schema, verifying that every topic is unique and derived from its signature.
    pub fn new() -> Result<Self, SchemaError> {
        let table = [
            (SequencerBatchDelivered::SIGNATURE_HASH, InboxEventKind::BatchDelivered),
            (SequencerBatchData::SIGNATURE_HASH, InboxEventKind::BatchData),
            (MessageDelivered::SIGNATURE_HASH, InboxEventKind::MessageDelivered),
            (InboxMessageDelivered::SIGNATURE_HASH, InboxEventKind::InboxMessageDelivered),
            (
                InboxMessageDeliveredFromOrigin::SIGNATURE_HASH,
                InboxEventKind::InboxMessageDeliveredFromOrigin,
            ),
        ];

        for (i, (topic, kind)) in table.iter().enumerate() {
            if keccak256(kind.signature()) != *topic {
                return Err(SchemaError::SignatureMismatch(*kind))
            }
            if let Some((_, first)) = table[..i].iter().find(|(t, _)| t == topic) {
                return Err(SchemaError::DuplicateTopic { topic: *topic, first: *first, second: *kind })
            }
        }

        Ok(Self { table })
    }

    /// Returns the topics of the schema.
    pub fn topics(&self) -> impl Iterator<Item = B256> + '_ {
        self.table.iter().map(|(topic, _)| *topic)
    }

    /// Returns the topic of the event kind.
    pub fn topic(&self, kind: InboxEventKind) -> B256 {
        self.table.iter().find(|(_, k)| *k == kind).map(|(topic, _)| *topic).unwrap_or_default()
    }

    /// Returns the event kind of the log, if it is an inbox event.
    pub fn kind(&self, log: &Log) -> Option<InboxEventKind> {
        let topic = log.topics().first()?;
        self.table.iter().find(|(t, _)| t == topic).map(|(_, kind)| *kind)
    }

    /// Returns true if the log is an inbox event.
    pub fn matches(&self, log: &Log) -> bool {
        self.kind(log).is_some()
    }

    /// Decodes the log. Returns `None` if the log is not an inbox event.
    pub fn decode(&self, log: &Log) -> Result<Option<InboxEvent>, EventDecodeError> {
        let Some(kind) = self.kind(log) else { return Ok(None) };
        let map = |source| EventDecodeError { kind, source };
        let event = match kind {
            InboxEventKind::BatchDelivered => {
                SequencerBatchDelivered::decode_log(log).map_err(map)?.data.into()
            }
            InboxEventKind::BatchData => {
                SequencerBatchData::decode_log(log).map_err(map)?.data.into()
            }
            InboxEventKind::MessageDelivered => {
                MessageDelivered::decode_log(log).map_err(map)?.data.into()
            }
            InboxEventKind::InboxMessageDelivered => {
                InboxMessageDelivered::decode_log(log).map_err(map)?.data.into()
            }
            InboxEventKind::InboxMessageDeliveredFromOrigin => {
                InboxMessageDeliveredFromOrigin::decode_log(log).map_err(map)?.data.into()
            }
        };
        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, Bytes, U256};

    #[test]
    fn test_schema_decodes_by_topic() -> eyre::Result<()> {
        // Given
        let schema = EventSchema::new()?;
        let event = InboxMessageDelivered {
            messageNum: U256::from(4),
            data: Bytes::from_static(b"foobar"),
        };
        let log = Log { address: Address::ZERO, data: event.encode_log_data() };

        // When
        let decoded = schema.decode(&log)?;

        // Then
        assert_eq!(decoded, Some(InboxEvent::InboxMessageDelivered(event)));
        Ok(())
    }

    #[test]
    fn test_schema_ignores_unknown_topics() -> eyre::Result<()> {
        let schema = EventSchema::new()?;
        let log = Log::new_unchecked(Address::ZERO, vec![B256::repeat_byte(1)], Bytes::new());
        assert!(!schema.matches(&log));
        assert!(schema.decode(&log)?.is_none());
        Ok(())
    }

    #[test]
    fn test_schema_fails_on_malformed_known_event() -> eyre::Result<()> {
        let schema = EventSchema::new()?;
        let log = Log::new_unchecked(
            Address::ZERO,
            vec![schema.topic(InboxEventKind::MessageDelivered)],
            Bytes::from_static(&[1, 2, 3]),
        );
        let err = schema.decode(&log).unwrap_err();
        assert_eq!(err.kind, InboxEventKind::MessageDelivered);
        Ok(())
    }
}
