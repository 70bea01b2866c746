//! Recording of the preimages a live node exports for replay.

use alloy_consensus::{ReceiptEnvelope, TxEnvelope};
use alloy_eips::eip2718::Encodable2718;
use alloy_primitives::{keccak256, B256};
use alloy_trie::{proof::ProofRetainer, HashBuilder, Nibbles, EMPTY_ROOT_HASH};
use mel_primitives::{
    merkle_tree_preimages, DelayedInboxMessage, MessageWithMetadata, ParentChainHeader,
};

/// A list of `(hash, preimage)` pairs.
pub type Preimages = Vec<(B256, Vec<u8>)>;

/// Builds the index keyed trie over `values` and returns its root with every node as a keccak
/// preimage. Keys are `rlp(index)`, as in the transactions and receipts tries.
pub fn trie_preimages<V: AsRef<[u8]>>(values: &[V]) -> (B256, Preimages) {
    if values.is_empty() {
        return (EMPTY_ROOT_HASH, Vec::new())
    }

    let mut leaves: Vec<(Nibbles, &[u8])> = values
        .iter()
        .enumerate()
        .map(|(index, value)| (Nibbles::unpack(alloy_rlp::encode(index as u64)), value.as_ref()))
        .collect();
    leaves.sort_by(|a, b| a.0.cmp(&b.0));

    let targets = leaves.iter().map(|(key, _)| *key).collect();
    let mut builder = HashBuilder::default().with_proof_retainer(ProofRetainer::new(targets));
    for (key, value) in leaves {
        builder.add_leaf(key, value);
    }
    let root = builder.root();

    let preimages = builder
        .take_proof_nodes()
        .values()
        .map(|node| (keccak256(node), node.to_vec()))
        .collect();
    (root, preimages)
}

/// Returns the preimages needed to replay the extraction of a block: the header and the nodes of
/// its transactions and receipts tries.
///
/// The tries are rebuilt from the provided bodies and are only consistent with the header when
/// the bodies are complete.
pub fn record_block_preimages(
    header: &ParentChainHeader,
    transactions: &[TxEnvelope],
    receipts: &[ReceiptEnvelope],
) -> Preimages {
    let header_rlp = alloy_rlp::encode(header.inner());
    let mut preimages = vec![(keccak256(&header_rlp), header_rlp)];

    let transactions: Vec<_> = transactions.iter().map(Encodable2718::encoded_2718).collect();
    preimages.extend(trie_preimages(&transactions).1);
    let receipts: Vec<_> = receipts.iter().map(Encodable2718::encoded_2718).collect();
    preimages.extend(trie_preimages(&receipts).1);

    preimages
}

/// Returns the root of the accumulator over `items` with the preimages of every tree node.
pub fn record_accumulator_preimages(items: &[B256]) -> (B256, Preimages) {
    merkle_tree_preimages(items)
}

/// Returns the root of the seen delayed message accumulator over `messages`, with every preimage
/// needed to walk from the root to any full message.
pub fn record_delayed_message_preimages(messages: &[DelayedInboxMessage]) -> (B256, Preimages) {
    let items: Vec<_> = messages.iter().map(DelayedInboxMessage::after_inbox_acc).collect();
    let (root, mut preimages) = record_accumulator_preimages(&items);
    preimages.extend(messages.iter().flat_map(DelayedInboxMessage::preimages));
    (root, preimages)
}

/// Returns the root of the message accumulator over `messages`, with every preimage needed to
/// walk from the root to any full message.
pub fn record_message_preimages(messages: &[MessageWithMetadata]) -> (B256, Preimages) {
    let encoded: Vec<_> = messages.iter().map(alloy_rlp::encode).collect();
    let items: Vec<_> = encoded.iter().map(keccak256).collect();
    let (root, mut preimages) = record_accumulator_preimages(&items);
    preimages.extend(items.into_iter().zip(encoded));
    (root, preimages)
}
