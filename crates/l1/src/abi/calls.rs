use alloy_primitives::Bytes;
use alloy_sol_types::{sol, SolCall};

sol! {
    #[cfg_attr(feature = "test-utils", derive(arbitrary::Arbitrary))]
    #[derive(Debug)]
    function addSequencerL2BatchFromOrigin(
        uint256 sequenceNumber,
        bytes calldata data,
        uint256 afterDelayedMessagesRead,
        address gasRefunder
    ) external;

    #[cfg_attr(feature = "test-utils", derive(arbitrary::Arbitrary))]
    #[derive(Debug)]
    function addSequencerL2BatchFromOrigin(
        uint256 sequenceNumber,
        bytes calldata data,
        uint256 afterDelayedMessagesRead,
        address gasRefunder,
        uint256 prevMessageCount,
        uint256 newMessageCount
    ) external;

    #[cfg_attr(feature = "test-utils", derive(arbitrary::Arbitrary))]
    #[derive(Debug)]
    function addSequencerL2Batch(
        uint256 sequenceNumber,
        bytes calldata data,
        uint256 afterDelayedMessagesRead,
        address gasRefunder,
        uint256 prevMessageCount,
        uint256 newMessageCount
    ) external;

    #[cfg_attr(feature = "test-utils", derive(arbitrary::Arbitrary))]
    #[derive(Debug)]
    function sendL2MessageFromOrigin(bytes calldata messageData) external;
}

/// A call posting a sequencer batch through its calldata.
#[derive(Debug, derive_more::From)]
pub enum AddSequencerBatchCall {
    /// The legacy four argument call from an EOA.
    FromOriginLegacy(addSequencerL2BatchFromOrigin_0Call),
    /// The call from an EOA.
    FromOrigin(addSequencerL2BatchFromOrigin_1Call),
    /// The call from a contract.
    FromContract(addSequencerL2BatchCall),
}

impl AddSequencerBatchCall {
    /// Tries to decode the calldata into a [`AddSequencerBatchCall`].
    pub fn try_decode(calldata: &[u8]) -> Option<Self> {
        let selector: [u8; 4] = calldata.get(0..4)?.try_into().ok()?;
        match selector {
            addSequencerL2BatchFromOrigin_0Call::SELECTOR => {
                addSequencerL2BatchFromOrigin_0Call::abi_decode(calldata).map(Into::into).ok()
            }
            addSequencerL2BatchFromOrigin_1Call::SELECTOR => {
                addSequencerL2BatchFromOrigin_1Call::abi_decode(calldata).map(Into::into).ok()
            }
            addSequencerL2BatchCall::SELECTOR => {
                addSequencerL2BatchCall::abi_decode(calldata).map(Into::into).ok()
            }
            _ => None,
        }
    }

    /// Returns the batch data carried by the call.
    pub fn into_data(self) -> Bytes {
        match self {
            Self::FromOriginLegacy(call) => call.data,
            Self::FromOrigin(call) => call.data,
            Self::FromContract(call) => call.data,
        }
    }
}

/// Tries to decode the message data of a `sendL2MessageFromOrigin` call.
pub fn try_decode_l2_message_from_origin(calldata: &[u8]) -> Option<Bytes> {
    let selector: [u8; 4] = calldata.get(0..4)?.try_into().ok()?;
    if selector != sendL2MessageFromOriginCall::SELECTOR {
        return None
    }
    sendL2MessageFromOriginCall::abi_decode(calldata).ok().map(|call| call.messageData)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, U256};

    #[test]
    fn test_decode_batch_calls() {
        let data = Bytes::from_static(&[0, 1, 2, 3]);

        let legacy = addSequencerL2BatchFromOrigin_0Call {
            sequenceNumber: U256::from(1),
            data: data.clone(),
            afterDelayedMessagesRead: U256::from(2),
            gasRefunder: Address::ZERO,
        }
        .abi_encode();
        let from_contract = addSequencerL2BatchCall {
            sequenceNumber: U256::from(1),
            data: data.clone(),
            afterDelayedMessagesRead: U256::from(2),
            gasRefunder: Address::ZERO,
            prevMessageCount: U256::from(3),
            newMessageCount: U256::from(4),
        }
        .abi_encode();

        for calldata in [legacy, from_contract] {
            let call = AddSequencerBatchCall::try_decode(&calldata).expect("decodes");
            assert_eq!(call.into_data(), data);
        }
    }

    #[test]
    fn test_decode_unknown_selector() {
        assert!(AddSequencerBatchCall::try_decode(&[0xde, 0xad, 0xbe, 0xef]).is_none());
        assert!(AddSequencerBatchCall::try_decode(&[0xde]).is_none());
    }

    #[test]
    fn test_decode_l2_message_from_origin() {
        let calldata =
            sendL2MessageFromOriginCall { messageData: Bytes::from_static(b"hello") }.abi_encode();
        assert_eq!(try_decode_l2_message_from_origin(&calldata), Some(Bytes::from_static(b"hello")));
        assert_eq!(try_decode_l2_message_from_origin(&calldata[1..]), None);
    }
}
