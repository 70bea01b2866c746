//! Lookups in a Merkle Patricia trie whose nodes are resolved as keccak preimages.

use crate::{replay::PreimageResolver, ProviderError, ProviderResult};
use alloy_primitives::{Bytes, B256};
use alloy_rlp::Header;
use alloy_trie::EMPTY_ROOT_HASH;

/// The number of items of a branch node.
const BRANCH_NODE_ITEMS: usize = 17;

/// A reference from a node to a child node.
#[derive(Debug, PartialEq, Eq)]
enum NodeRef {
    Empty,
    Hash(B256),
    Inline(Bytes),
}

/// Returns the value stored under `key` in the trie rooted at `root`.
///
/// The traversal only succeeds when the accumulated path nibbles exactly match the key, and
/// returns `None` when the key is absent.
pub async fn trie_get<R: PreimageResolver + ?Sized>(
    resolver: &R,
    root: B256,
    key: &[u8],
) -> ProviderResult<Option<Bytes>> {
    if root == EMPTY_ROOT_HASH {
        return Ok(None);
    }

    let path: Vec<u8> = key
        .iter()
        .flat_map(|byte| [byte >> 4, byte & 0x0f])
        .collect();
    let mut depth = 0;
    let mut node = resolver.resolve_keccak(root).await?;

    loop {
        let items = list_items(&node)?;
        let child = match items.len() {
            BRANCH_NODE_ITEMS => {
                if depth == path.len() {
                    let value = string_payload(items[16])?;
                    return Ok((!value.is_empty()).then(|| Bytes::copy_from_slice(value)));
                }
                let child = node_ref(items[path[depth] as usize])?;
                depth += 1;
                child
            }
            2 => {
                let (is_leaf, nibbles) = decode_path(string_payload(items[0])?)?;
                let remaining = &path[depth..];
                if is_leaf {
                    if remaining != nibbles.as_slice() {
                        return Ok(None);
                    }
                    return Ok(Some(Bytes::copy_from_slice(string_payload(items[1])?)));
                }
                if !remaining.starts_with(&nibbles) {
                    return Ok(None);
                }
                depth += nibbles.len();
                node_ref(items[1])?
            }
            _ => {
                return Err(ProviderError::InvalidTrieNode(
                    "unexpected number of node items",
                ))
            }
        };

        node = match child {
            NodeRef::Empty => return Ok(None),
            NodeRef::Hash(hash) => resolver.resolve_keccak(hash).await?,
            NodeRef::Inline(node) => node,
        };
    }
}

/// Splits an RLP encoded node into its raw items.
fn list_items(node: &[u8]) -> ProviderResult<Vec<&[u8]>> {
    let mut buf = node;
    let header = Header::decode(&mut buf)?;
    if !header.list {
        return Err(ProviderError::InvalidTrieNode("node is not a list"));
    }
    let mut payload = buf
        .get(..header.payload_length)
        .ok_or(alloy_rlp::Error::InputTooShort)?;

    let mut items = Vec::with_capacity(BRANCH_NODE_ITEMS);
    while !payload.is_empty() {
        let mut rest = payload;
        let item_header = Header::decode(&mut rest)?;
        // single bytes below 0x80 are their own encoding and the header does not advance.
        let len = (payload.len() - rest.len()) + item_header.payload_length;
        let item = payload.get(..len).ok_or(alloy_rlp::Error::InputTooShort)?;
        items.push(item);
        payload = &payload[len..];
    }
    Ok(items)
}

/// Returns the payload of an RLP string item.
fn string_payload(item: &[u8]) -> ProviderResult<&[u8]> {
    let mut buf = item;
    let header = Header::decode(&mut buf)?;
    if header.list {
        return Err(ProviderError::InvalidTrieNode("expected a string item"));
    }
    Ok(buf
        .get(..header.payload_length)
        .ok_or(alloy_rlp::Error::InputTooShort)?)
}

fn node_ref(item: &[u8]) -> ProviderResult<NodeRef> {
    if item
        .first()
        .is_some_and(|byte| *byte >= alloy_rlp::EMPTY_LIST_CODE)
    {
        return Ok(NodeRef::Inline(Bytes::copy_from_slice(item)));
    }
    match string_payload(item)? {
        [] => Ok(NodeRef::Empty),
        hash if hash.len() == 32 => Ok(NodeRef::Hash(B256::from_slice(hash))),
        _ => Err(ProviderError::InvalidTrieNode("invalid child reference")),
    }
}

/// Decodes a hex prefix encoded path into its leaf flag and nibbles.
fn decode_path(compact: &[u8]) -> ProviderResult<(bool, Vec<u8>)> {
    let (first, rest) = compact
        .split_first()
        .ok_or(ProviderError::InvalidTrieNode("empty node path"))?;
    let flag = first >> 4;
    if flag > 3 {
        return Err(ProviderError::InvalidTrieNode("invalid path prefix"));
    }

    let mut nibbles = Vec::with_capacity(rest.len() * 2 + 1);
    if flag & 1 == 1 {
        nibbles.push(first & 0x0f);
    }
    for byte in rest {
        nibbles.extend([byte >> 4, byte & 0x0f]);
    }
    Ok((flag >= 2, nibbles))
}
