//! Test utilities for the extraction function.

use crate::{extract_messages, DataSources, ExtractionOutput, ExtractionResult};
use alloy_consensus::{SignableTransaction, TxEip4844, TxEnvelope};
use alloy_primitives::{keccak256, Address, Bytes, Log, Signature, B256, U256};
use alloy_sol_types::{SolCall, SolEvent};
use mel_codec::{encode_blobs, encode_segments, SequencerMessageHeader};
use mel_db::{MelDatabase, MemoryKeyValueStore};
use mel_l1::{
    abi::{
        calls::{addSequencerL2BatchFromOrigin_1Call, sendL2MessageFromOriginCall},
        logs::{
            InboxMessageDelivered, InboxMessageDeliveredFromOrigin, MessageDelivered,
            SequencerBatchData, SequencerBatchDelivered, TimeBounds as EventTimeBounds,
        },
    },
    EventSchema,
};
use mel_primitives::{
    kind, test_utils::header, BatchDataLocation, BatchPostingReport,
    DelayedInboxMessage, DelayedMessageBacklog, L1IncomingMessage, L1IncomingMessageHeader,
    MelState, ParentChainHeader, TimeBounds,
};
use mel_providers::{
    replay::Preimages,
    test_utils::{replayable_block, transaction, MockParentChain},
    LiveDataSource, MockBlobProvider,
};

/// The address posting batch posting reports.
pub const BATCH_POSTER: Address = Address::repeat_byte(0xba);

/// The base fee recorded in delayed messages.
pub const L1_BASE_FEE: u64 = 7;

fn log<E: SolEvent>(address: Address, event: &E) -> Log {
    Log { address, data: event.encode_log_data() }
}

/// Builds the transactions and logs the parent chain inbox contracts emit.
#[derive(Debug, Clone)]
pub struct TestInbox {
    /// The inbox event schema.
    pub schema: EventSchema,
    /// The sequencer inbox address.
    pub sequencer_inbox: Address,
    /// The bridge address.
    pub bridge: Address,
    /// The delayed inbox address.
    pub delayed_inbox: Address,
    /// The time bounds posted with every batch.
    pub time_bounds: TimeBounds,
    /// The blobs of blob batches.
    pub blobs: MockBlobProvider,
    nonce: u64,
    delayed_count: u64,
    delayed_acc: B256,
    batch_acc: B256,
}

impl Default for TestInbox {
    fn default() -> Self {
        Self {
            schema: EventSchema::new().expect("valid schema"),
            sequencer_inbox: Address::repeat_byte(0x51),
            bridge: Address::repeat_byte(0xb1),
            delayed_inbox: Address::repeat_byte(0xd1),
            time_bounds: TimeBounds {
                min_timestamp: 0,
                max_timestamp: u64::MAX,
                min_block_number: 0,
                max_block_number: u64::MAX,
            },
            blobs: MockBlobProvider::default(),
            nonce: 0,
            delayed_count: 0,
            delayed_acc: B256::ZERO,
            batch_acc: B256::ZERO,
        }
    }
}

impl TestInbox {
    /// Returns the genesis state anchored at `genesis`, with an unbounded backlog attached.
    pub fn genesis_state(&self, genesis: &ParentChainHeader) -> MelState {
        let mut state =
            MelState::genesis(1, genesis.number, genesis.hash(), self.sequencer_inbox, self.bridge);
        state.set_delayed_backlog(DelayedMessageBacklog::new(0, None));
        state
    }

    /// Returns the number of delayed messages delivered so far.
    pub const fn delayed_count(&self) -> u64 {
        self.delayed_count
    }

    /// Returns the transaction sending `data` to the delayed inbox and the logs it emits.
    pub fn delayed_message(
        &mut self,
        block_number: u64,
        message_kind: u8,
        data: Bytes,
    ) -> (TxEnvelope, Vec<Log>) {
        let tx = self.transaction(self.delayed_inbox, Bytes::new());
        let (index, delivered) = self.message_delivered(
            block_number,
            self.delayed_inbox,
            message_kind,
            Address::repeat_byte(0xee),
            &data,
        );
        let payload =
            log(self.delayed_inbox, &InboxMessageDelivered { messageNum: U256::from(index), data });
        (tx, vec![delivered, payload])
    }

    /// Returns a `sendL2MessageFromOrigin` transaction, whose payload is only carried by its call
    /// data, and the logs it emits.
    pub fn delayed_message_from_origin(
        &mut self,
        block_number: u64,
        data: Bytes,
    ) -> (TxEnvelope, Vec<Log>) {
        let input = sendL2MessageFromOriginCall { messageData: data.clone() }.abi_encode();
        let tx = self.transaction(self.delayed_inbox, input.into());
        let (index, delivered) = self.message_delivered(
            block_number,
            self.delayed_inbox,
            kind::L2_MESSAGE,
            Address::repeat_byte(0xee),
            &data,
        );
        let payload = log(
            self.delayed_inbox,
            &InboxMessageDeliveredFromOrigin { messageNum: U256::from(index) },
        );
        (tx, vec![delivered, payload])
    }

    /// Returns the serialized batch made of the posted time bounds, `after_delayed` and the
    /// payload.
    pub fn serialize(&self, after_delayed: u64, payload: &[u8]) -> Vec<u8> {
        let header = SequencerMessageHeader {
            min_timestamp: self.time_bounds.min_timestamp,
            max_timestamp: self.time_bounds.max_timestamp,
            min_l1_block: self.time_bounds.min_block_number,
            max_l1_block: self.time_bounds.max_block_number,
            after_delayed_messages: after_delayed,
        };
        [header.encode().as_slice(), payload].concat()
    }

    /// Returns the transaction posting batch `sequence_number` made of `segments`, along with the
    /// logs it emits, including the batch posting report delivered to the bridge.
    pub fn batch(
        &mut self,
        block_number: u64,
        sequence_number: u64,
        after_delayed: u64,
        segments: &[Bytes],
        location: BatchDataLocation,
    ) -> (TxEnvelope, Vec<Log>) {
        let payload: Bytes =
            encode_segments(segments).expect("segments compress").into();
        self.batch_with_payload(block_number, sequence_number, after_delayed, payload, location)
    }

    /// Returns the transaction posting batch `sequence_number` with a raw payload.
    pub fn batch_with_payload(
        &mut self,
        block_number: u64,
        sequence_number: u64,
        after_delayed: u64,
        payload: Bytes,
        location: BatchDataLocation,
    ) -> (TxEnvelope, Vec<Log>) {
        let mut logs = Vec::new();
        let (tx, serialized) = match location {
            BatchDataLocation::TxInput => {
                let input = addSequencerL2BatchFromOrigin_1Call {
                    sequenceNumber: U256::from(sequence_number),
                    data: payload.clone(),
                    afterDelayedMessagesRead: U256::from(after_delayed),
                    gasRefunder: Address::ZERO,
                    prevMessageCount: U256::ZERO,
                    newMessageCount: U256::ZERO,
                }
                .abi_encode();
                let tx = self.transaction(self.sequencer_inbox, input.into());
                (tx, self.serialize(after_delayed, &payload))
            }
            BatchDataLocation::SeparateBatchEvent => {
                logs.push(log(
                    self.sequencer_inbox,
                    &SequencerBatchData {
                        batchSequenceNumber: U256::from(sequence_number),
                        data: payload.clone(),
                    },
                ));
                let tx = self.transaction(self.sequencer_inbox, Bytes::new());
                (tx, self.serialize(after_delayed, &payload))
            }
            BatchDataLocation::NoData => {
                let tx = self.transaction(self.sequencer_inbox, Bytes::new());
                (tx, self.serialize(after_delayed, &[]))
            }
            BatchDataLocation::Blob => {
                let hashes: Vec<B256> = encode_blobs(&payload)
                    .into_iter()
                    .map(|blob| {
                        let mut hash = keccak256(blob.as_slice());
                        hash.0[0] = 0x01;
                        self.blobs.insert(hash, blob);
                        hash
                    })
                    .collect();
                let mut data = vec![mel_primitives::BLOB_HASHES_HEADER_FLAG];
                hashes.iter().for_each(|hash| data.extend_from_slice(hash.as_slice()));
                let tx = self.blob_transaction(hashes);
                (tx, self.serialize(after_delayed, &data))
            }
        };

        let before_acc = self.batch_acc;
        self.batch_acc = keccak256([before_acc.as_slice(), keccak256(&serialized).as_slice()].concat());
        logs.push(log(
            self.sequencer_inbox,
            &SequencerBatchDelivered {
                batchSequenceNumber: U256::from(sequence_number),
                beforeAcc: before_acc,
                afterAcc: self.batch_acc,
                delayedAcc: self.delayed_acc,
                afterDelayedMessagesRead: U256::from(after_delayed),
                timeBounds: EventTimeBounds {
                    minTimestamp: self.time_bounds.min_timestamp,
                    maxTimestamp: self.time_bounds.max_timestamp,
                    minBlockNumber: self.time_bounds.min_block_number,
                    maxBlockNumber: self.time_bounds.max_block_number,
                },
                dataLocation: location as u8,
            },
        ));

        let report = self.report(sequence_number, keccak256(&serialized));
        let (index, delivered) = self.message_delivered(
            block_number,
            self.sequencer_inbox,
            kind::BATCH_POSTING_REPORT,
            self.sequencer_inbox,
            &report,
        );
        logs.push(delivered);
        logs.push(log(
            self.sequencer_inbox,
            &InboxMessageDelivered { messageNum: U256::from(index), data: report },
        ));

        (tx, logs)
    }

    /// Returns an encoded batch posting report for the batch.
    pub fn report(&self, sequence_number: u64, data_hash: B256) -> Bytes {
        BatchPostingReport {
            batch_timestamp: U256::from(1_700_000_000u64),
            batch_poster: BATCH_POSTER,
            data_hash,
            batch_number: sequence_number,
            l1_base_fee: U256::from(L1_BASE_FEE),
            extra_gas: 0,
        }
        .encode()
    }

    /// Returns the delayed message the extraction function builds for the next delivered
    /// message.
    fn next_delayed(
        &self,
        block_number: u64,
        message_kind: u8,
        sender: Address,
        data: &Bytes,
    ) -> DelayedInboxMessage {
        DelayedInboxMessage {
            before_inbox_acc: self.delayed_acc,
            message: L1IncomingMessage {
                header: L1IncomingMessageHeader {
                    kind: message_kind,
                    poster: sender,
                    block_number,
                    timestamp: block_number * 12,
                    request_id: Some(B256::from(U256::from(self.delayed_count))),
                    l1_base_fee: U256::from(L1_BASE_FEE),
                },
                l2_msg: data.clone(),
                batch_gas_cost: None,
            },
        }
    }

    fn message_delivered(
        &mut self,
        block_number: u64,
        inbox: Address,
        message_kind: u8,
        sender: Address,
        data: &Bytes,
    ) -> (u64, Log) {
        let index = self.delayed_count;
        let message = self.next_delayed(block_number, message_kind, sender, data);
        let event = MessageDelivered {
            messageIndex: U256::from(index),
            beforeInboxAcc: self.delayed_acc,
            inbox,
            kind: message_kind,
            sender,
            messageDataHash: keccak256(data),
            baseFeeL1: U256::from(L1_BASE_FEE),
            timestamp: message.message.header.timestamp,
        };
        self.delayed_acc = message.after_inbox_acc();
        self.delayed_count += 1;
        (index, log(self.bridge, &event))
    }

    fn transaction(&mut self, to: Address, input: Bytes) -> TxEnvelope {
        self.nonce += 1;
        transaction(self.nonce, to, input)
    }

    fn blob_transaction(&mut self, blob_versioned_hashes: Vec<B256>) -> TxEnvelope {
        self.nonce += 1;
        let tx = TxEip4844 {
            chain_id: 1,
            nonce: self.nonce,
            gas_limit: 1_000_000,
            max_fee_per_gas: 1,
            max_priority_fee_per_gas: 1,
            to: self.sequencer_inbox,
            blob_versioned_hashes,
            max_fee_per_blob_gas: 1,
            ..Default::default()
        };
        tx.into_signed(Signature::new(U256::from(1), U256::from(1), false)).into()
    }
}

/// A parent chain served by the live data source, extracted block by block on top of an in
/// memory database.
#[derive(Debug)]
pub struct TestChain {
    /// The inbox fixture.
    pub inbox: TestInbox,
    /// The parent chain.
    pub chain: MockParentChain,
    /// The live data source over the parent chain.
    pub source: LiveDataSource<MockParentChain>,
    /// The database holding the delayed messages.
    pub db: MelDatabase<MemoryKeyValueStore>,
    /// The state after the last extracted block.
    pub state: MelState,
    /// The last extracted block.
    pub head: ParentChainHeader,
}

impl Default for TestChain {
    fn default() -> Self {
        let inbox = TestInbox::default();
        let chain = MockParentChain::default();
        let genesis = header(0, B256::ZERO, 0);
        chain.push_block(genesis.clone(), Vec::new());
        let source = LiveDataSource::new(chain.clone(), &inbox.schema, 16);
        let state = inbox.genesis_state(&genesis);
        Self {
            inbox,
            chain,
            source,
            db: MelDatabase::new(MemoryKeyValueStore::default()),
            state,
            head: genesis,
        }
    }
}

impl TestChain {
    /// Returns the number of the next block.
    pub fn next_number(&self) -> u64 {
        self.head.number + 1
    }

    /// Appends a block made of the provided transactions on top of the head.
    pub fn push_block(&self, transactions: Vec<(TxEnvelope, Vec<Log>)>) -> ParentChainHeader {
        let block = header(self.next_number(), self.head.hash(), 0);
        self.chain.push_block(block.clone(), transactions);
        block
    }

    /// Appends a block committing to the provided transactions in its tries, and returns it with
    /// the preimages needed to replay it.
    pub fn push_replayable_block(
        &self,
        transactions: Vec<(TxEnvelope, Vec<Log>)>,
    ) -> (ParentChainHeader, Preimages) {
        let (block, preimages) =
            replayable_block(self.next_number(), self.head.hash(), &transactions);
        self.chain.push_block(block.clone(), transactions);
        (block, preimages)
    }

    /// Runs the extraction function for `block` on top of the current state.
    pub async fn extract(&self, block: &ParentChainHeader) -> ExtractionResult<ExtractionOutput> {
        let sources = DataSources {
            schema: &self.inbox.schema,
            logs: &self.source,
            transactions: &self.source,
            delayed_messages: &self.db,
            blobs: &self.inbox.blobs,
        };
        extract_messages(&self.state, block, &sources).await
    }

    /// Persists the output of the extraction of `block` and moves the head to it.
    pub async fn commit(&mut self, block: ParentChainHeader, output: &ExtractionOutput) {
        self.db
            .save_delayed_messages(output.first_delayed_message_index(), &output.delayed_messages)
            .await
            .expect("in memory store");
        self.state = output.state.clone();
        if let Some(backlog) = self.state.delayed_backlog_mut() {
            backlog.commit_dirties();
        }
        self.head = block;
    }

    /// Appends a block made of the transactions, extracts it and commits the output.
    pub async fn advance(
        &mut self,
        transactions: Vec<(TxEnvelope, Vec<Log>)>,
    ) -> ExtractionResult<ExtractionOutput> {
        let block = self.push_block(transactions);
        let output = self.extract(&block).await?;
        self.commit(block, &output).await;
        Ok(output)
    }
}
