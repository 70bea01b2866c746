use alloy_primitives::{address, keccak256, Address, Bytes, B256, U256};
use alloy_rlp::{Buf, BufMut, Decodable, Encodable, Header, RlpDecodable, RlpEncodable};
use std::vec::Vec;

/// The kinds of L1 incoming messages.
pub mod kind {
    /// An L2 message.
    pub const L2_MESSAGE: u8 = 3;
    /// End of an L2 block.
    pub const END_OF_BLOCK: u8 = 6;
    /// An L2 message funded by L1.
    pub const L2_FUNDED_BY_L1: u8 = 7;
    /// A rollup event.
    pub const ROLLUP_EVENT: u8 = 8;
    /// A retryable ticket submission.
    pub const SUBMIT_RETRYABLE: u8 = 9;
    /// A batch for gas estimation.
    pub const BATCH_FOR_GAS_ESTIMATION: u8 = 10;
    /// The chain initialization message.
    pub const INITIALIZE: u8 = 11;
    /// An eth deposit.
    pub const ETH_DEPOSIT: u8 = 12;
    /// A batch posting report.
    pub const BATCH_POSTING_REPORT: u8 = 13;
    /// A placeholder for a provably empty message slot.
    pub const INVALID: u8 = 0xFF;
}

/// The poster of every message carried inside a sequencer batch.
pub const BATCH_POSTER_ADDRESS: Address = address!("0xa4b000000000000000000073657175656e636572");

/// The header of an L1 incoming message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(any(test, feature = "arbitrary"), derive(arbitrary::Arbitrary))]
pub struct L1IncomingMessageHeader {
    /// The kind of the message.
    pub kind: u8,
    /// The poster of the message.
    pub poster: Address,
    /// The parent chain block number.
    pub block_number: u64,
    /// The timestamp.
    pub timestamp: u64,
    /// The request id, set for delayed messages.
    pub request_id: Option<B256>,
    /// The L1 base fee.
    pub l1_base_fee: U256,
}

impl L1IncomingMessageHeader {
    /// Returns the keccak hash of the RLP encoded header.
    pub fn hash(&self) -> B256 {
        keccak256(alloy_rlp::encode(self))
    }

    fn payload_length(&self) -> usize {
        let request_id_len = match &self.request_id {
            Some(id) => id.length(),
            None => 1,
        };
        self.kind.length() +
            self.poster.length() +
            self.block_number.length() +
            self.timestamp.length() +
            request_id_len +
            self.l1_base_fee.length()
    }
}

impl Encodable for L1IncomingMessageHeader {
    fn encode(&self, out: &mut dyn BufMut) {
        Header { list: true, payload_length: self.payload_length() }.encode(out);
        self.kind.encode(out);
        self.poster.encode(out);
        self.block_number.encode(out);
        self.timestamp.encode(out);
        match &self.request_id {
            Some(id) => id.encode(out),
            None => out.put_u8(alloy_rlp::EMPTY_STRING_CODE),
        }
        self.l1_base_fee.encode(out);
    }

    fn length(&self) -> usize {
        let payload_length = self.payload_length();
        payload_length + alloy_rlp::length_of_length(payload_length)
    }
}

impl Decodable for L1IncomingMessageHeader {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let header = Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString)
        }
        let started_len = buf.len();

        let kind = Decodable::decode(buf)?;
        let poster = Decodable::decode(buf)?;
        let block_number = Decodable::decode(buf)?;
        let timestamp = Decodable::decode(buf)?;
        let request_id = if buf.first() == Some(&alloy_rlp::EMPTY_STRING_CODE) {
            buf.advance(1);
            None
        } else {
            Some(Decodable::decode(buf)?)
        };
        let l1_base_fee = Decodable::decode(buf)?;

        let consumed = started_len - buf.len();
        if consumed != header.payload_length {
            return Err(alloy_rlp::Error::ListLengthMismatch {
                expected: header.payload_length,
                got: consumed,
            })
        }

        Ok(Self { kind, poster, block_number, timestamp, request_id, l1_base_fee })
    }
}

/// An L1 incoming message, the unit consumed by the execution layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(any(test, feature = "arbitrary"), derive(arbitrary::Arbitrary))]
pub struct L1IncomingMessage {
    /// The header of the message.
    pub header: L1IncomingMessageHeader,
    /// The message payload.
    pub l2_msg: Bytes,
    /// The legacy gas cost of the batch, only set on batch posting reports.
    pub batch_gas_cost: Option<u64>,
}

impl L1IncomingMessage {
    /// Returns the sentinel message standing in for a provably empty message slot.
    pub fn invalid(block_number: u64, timestamp: u64) -> Self {
        Self {
            header: L1IncomingMessageHeader {
                kind: kind::INVALID,
                poster: Address::ZERO,
                block_number,
                timestamp,
                request_id: None,
                l1_base_fee: U256::ZERO,
            },
            l2_msg: Bytes::new(),
            batch_gas_cost: None,
        }
    }

    /// Returns an L2 message posted by the batch poster.
    pub fn l2_message(block_number: u64, timestamp: u64, l2_msg: Bytes) -> Self {
        Self {
            header: L1IncomingMessageHeader {
                kind: kind::L2_MESSAGE,
                poster: BATCH_POSTER_ADDRESS,
                block_number,
                timestamp,
                request_id: None,
                l1_base_fee: U256::ZERO,
            },
            l2_msg,
            batch_gas_cost: None,
        }
    }

    fn payload_length(&self) -> usize {
        self.header.length() +
            self.l2_msg.length() +
            self.batch_gas_cost.as_ref().map(Encodable::length).unwrap_or_default()
    }
}

impl Encodable for L1IncomingMessage {
    fn encode(&self, out: &mut dyn BufMut) {
        Header { list: true, payload_length: self.payload_length() }.encode(out);
        self.header.encode(out);
        self.l2_msg.encode(out);
        if let Some(cost) = self.batch_gas_cost {
            cost.encode(out);
        }
    }

    fn length(&self) -> usize {
        let payload_length = self.payload_length();
        payload_length + alloy_rlp::length_of_length(payload_length)
    }
}

impl Decodable for L1IncomingMessage {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let header = Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString)
        }
        let started_len = buf.len();

        let msg_header = Decodable::decode(buf)?;
        let l2_msg = Decodable::decode(buf)?;
        let batch_gas_cost = if started_len - buf.len() < header.payload_length {
            Some(Decodable::decode(buf)?)
        } else {
            None
        };

        let consumed = started_len - buf.len();
        if consumed != header.payload_length {
            return Err(alloy_rlp::Error::ListLengthMismatch {
                expected: header.payload_length,
                got: consumed,
            })
        }

        Ok(Self { header: msg_header, l2_msg, batch_gas_cost })
    }
}

/// A message along with the number of delayed messages read once it is applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
#[cfg_attr(any(test, feature = "arbitrary"), derive(arbitrary::Arbitrary))]
pub struct MessageWithMetadata {
    /// The message.
    pub message: L1IncomingMessage,
    /// The delayed message count after this message.
    pub delayed_messages_read: u64,
}

impl MessageWithMetadata {
    /// Returns the item folded into the message accumulator.
    pub fn hash(&self) -> B256 {
        keccak256(alloy_rlp::encode(self))
    }
}

/// A message posted to the delayed inbox.
#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
#[cfg_attr(any(test, feature = "arbitrary"), derive(arbitrary::Arbitrary))]
pub struct DelayedInboxMessage {
    /// The delayed inbox accumulator before this message.
    pub before_inbox_acc: B256,
    /// The message.
    pub message: L1IncomingMessage,
}

impl DelayedInboxMessage {
    /// Returns the content hash `keccak(keccak(header) ‖ keccak(payload))`.
    pub fn content_hash(&self) -> B256 {
        crate::accumulator::hash_pair(self.message.header.hash(), keccak256(&self.message.l2_msg))
    }

    /// Returns the delayed inbox accumulator after this message, `keccak(beforeAcc ‖
    /// contentHash)`. This is the digest held by the backlog and the seen-delayed accumulator.
    pub fn after_inbox_acc(&self) -> B256 {
        crate::accumulator::hash_pair(self.before_inbox_acc, self.content_hash())
    }

    /// Returns the `(hash, preimage)` pairs linking [`Self::after_inbox_acc`] to the full message.
    pub fn preimages(&self) -> Vec<(B256, Vec<u8>)> {
        let header_rlp = alloy_rlp::encode(&self.message.header);
        let header_hash = keccak256(&header_rlp);
        let payload_hash = keccak256(&self.message.l2_msg);
        let content = [header_hash.as_slice(), payload_hash.as_slice()].concat();
        let content_hash = keccak256(&content);
        let acc = [self.before_inbox_acc.as_slice(), content_hash.as_slice()].concat();
        vec![
            (keccak256(&acc), acc),
            (content_hash, content),
            (header_hash, header_rlp),
            (payload_hash, self.message.l2_msg.to_vec()),
        ]
    }
}

/// An error while parsing message payloads.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MessageError {
    /// The payload ended before a mandatory field.
    #[error("unexpected end of batch posting report, expected {expected} bytes at offset {offset}")]
    UnexpectedEof {
        /// The offset of the field.
        offset: usize,
        /// The expected field size.
        expected: usize,
    },
    /// The batch number does not fit in 64 bits.
    #[error("batch number {0} is not a u64")]
    BatchNumberOverflow(U256),
}

/// The fields of a batch posting report message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchPostingReport {
    /// The batch timestamp.
    pub batch_timestamp: U256,
    /// The batch poster.
    pub batch_poster: Address,
    /// The keccak hash of the serialized batch.
    pub data_hash: B256,
    /// The sequence number of the batch.
    pub batch_number: u64,
    /// The L1 base fee at posting time.
    pub l1_base_fee: U256,
    /// Extra gas charged to the batch.
    pub extra_gas: u64,
}

impl BatchPostingReport {
    /// Parses the payload of a [`kind::BATCH_POSTING_REPORT`] message.
    pub fn parse(data: &[u8]) -> Result<Self, MessageError> {
        let mut reader = FieldReader { data, offset: 0 };
        let batch_timestamp = U256::from_be_slice(reader.take(32)?);
        let batch_poster = Address::from_slice(reader.take(20)?);
        let data_hash = B256::from_slice(reader.take(32)?);
        let batch_number = U256::from_be_slice(reader.take(32)?);
        let batch_number =
            batch_number.try_into().map_err(|_| MessageError::BatchNumberOverflow(batch_number))?;
        let l1_base_fee = U256::from_be_slice(reader.take(32)?);
        // extra gas is optional, a missing field is zero.
        let extra_gas = reader
            .take(8)
            .map(|bytes| {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(bytes);
                u64::from_be_bytes(buf)
            })
            .unwrap_or_default();

        Ok(Self { batch_timestamp, batch_poster, data_hash, batch_number, l1_base_fee, extra_gas })
    }

    /// Returns the encoded report payload.
    pub fn encode(&self) -> Bytes {
        let mut out = Vec::with_capacity(156);
        out.extend_from_slice(&self.batch_timestamp.to_be_bytes::<32>());
        out.extend_from_slice(self.batch_poster.as_slice());
        out.extend_from_slice(self.data_hash.as_slice());
        out.extend_from_slice(&U256::from(self.batch_number).to_be_bytes::<32>());
        out.extend_from_slice(&self.l1_base_fee.to_be_bytes::<32>());
        if self.extra_gas != 0 {
            out.extend_from_slice(&self.extra_gas.to_be_bytes());
        }
        out.into()
    }
}

struct FieldReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> FieldReader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], MessageError> {
        let bytes = self
            .data
            .get(self.offset..self.offset + len)
            .ok_or(MessageError::UnexpectedEof { offset: self.offset, expected: len })?;
        self.offset += len;
        Ok(bytes)
    }
}
