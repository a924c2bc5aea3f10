//! §4.5: parsing raw RLP bytes fetched from a node's backing store into a [Node].
//!
//! Resolving a child slot's raw bytes (a 32-byte hash, or an embedded sub-encoding) into a
//! [NodeReference] is a host concern — only the `NodeSource` implementation knows how ids
//! are allocated for previously-unseen hashes — so every decode entry point here takes a
//! resolver closure rather than assuming an arena of its own.

use alloc::vec::Vec;

use alloy_primitives::{keccak256, Address, B256, U256};

use crate::errors::{DecodeError, DecodeResult};
use crate::node::{Account, AccountInfo, Branch, Extension, HashSlot, Node, NodeReference, Value};
use crate::rlp::{decode_compact_path, decode_list_items, DecodedItem};

/// A child slot's raw content, as seen during decode, handed to the caller's resolver.
#[derive(Debug, Clone, Copy)]
pub enum ChildSlot<'a> {
    /// A real 32-byte hash reference.
    Hash(B256),
    /// An embedded child's full raw encoding.
    Embedded(&'a [u8]),
}

fn slot_of(item: &DecodedItem<'_>) -> DecodeResult<(HashSlot, ChildSlot<'_>)> {
    if item.is_list {
        if item.bytes.len() >= 32 {
            return Err(DecodeError::FieldTooLarge(item.bytes.len()));
        }
        Ok((HashSlot::embed(item.bytes), ChildSlot::Embedded(item.bytes)))
    } else {
        match item.bytes.len() {
            32 => {
                let hash = B256::from_slice(item.bytes);
                Ok((HashSlot::from_hash(hash), ChildSlot::Hash(hash)))
            }
            0 => Ok((HashSlot::ZERO, ChildSlot::Hash(B256::ZERO))),
            n => Err(DecodeError::FieldTooLarge(n)),
        }
    }
}

/// Decodes a complete node from its RLP encoding. `resolve_child` maps each non-empty
/// child slot's raw content to a [NodeReference]; it is never called for an empty slot.
pub fn decode_from_rlp<F>(bytes: &[u8], mut resolve_child: F) -> DecodeResult<Node>
where
    F: FnMut(ChildSlot<'_>) -> NodeReference,
{
    let items = decode_list_items(bytes)?;
    let self_hash = if bytes.len() < 32 { HashSlot::embed(bytes) } else { HashSlot::from_hash(keccak256(bytes)) };

    match items.len() {
        17 => decode_branch(&items, self_hash, &mut resolve_child),
        2 => decode_two_item(&items, self_hash, &mut resolve_child),
        n => Err(DecodeError::UnexpectedLength(n)),
    }
}

/// Decodes a child's embedded encoding directly into a [Node], without a `NodeSource`
/// round trip. Used by callers (the witness/diff engines) that already hold the bytes of
/// an embedded child in hand and want to recurse into it.
pub fn decode_embedded_from_rlp<F>(bytes: &[u8], resolve_child: F) -> DecodeResult<Node>
where
    F: FnMut(ChildSlot<'_>) -> NodeReference,
{
    if bytes.len() >= 32 {
        return Err(DecodeError::FieldTooLarge(bytes.len()));
    }
    decode_from_rlp(bytes, resolve_child)
}

fn decode_branch<F>(items: &[DecodedItem<'_>], self_hash: HashSlot, resolve_child: &mut F) -> DecodeResult<Node>
where
    F: FnMut(ChildSlot<'_>) -> NodeReference,
{
    let mut children = [NodeReference::EMPTY; 16];
    let mut child_hashes = [HashSlot::ZERO; 16];
    let mut embedded_mask = 0u16;

    for i in 0..16 {
        let (slot, content) = slot_of(&items[i])?;
        if slot.is_zero() {
            continue;
        }
        children[i] = resolve_child(content);
        child_hashes[i] = slot;
        if slot.embedded_encoding().is_some() {
            embedded_mask |= 1 << i;
        }
    }

    // the 17th slot must be the canonical empty string: this crate's fixed-length hashed
    // paths mean a branch never itself terminates a key (invariant 4).
    if !items[16].is_list && !items[16].bytes.is_empty() {
        return Err(DecodeError::MalformedAccount("branch value slot must be empty"));
    }

    Ok(Node::Branch(Branch {
        children,
        child_hashes,
        embedded_mask,
        dirty_mask: 0,
        self_hash,
        self_dirty: false,
    }))
}

fn decode_two_item<F>(items: &[DecodedItem<'_>], self_hash: HashSlot, resolve_child: &mut F) -> DecodeResult<Node>
where
    F: FnMut(ChildSlot<'_>) -> NodeReference,
{
    if items[0].is_list {
        return Err(DecodeError::UnexpectedShape { expected: "string", found: "list" });
    }
    let (path, is_leaf) = decode_compact_path(items[0].bytes)?;
    let path_length = path.len() as u8;

    if is_leaf {
        decode_leaf(path_length, &items[1], resolve_child)
    } else {
        let (slot, content) = slot_of(&items[1])?;
        let next = resolve_child(content);
        Ok(Node::Extension(Extension {
            path,
            next,
            next_hash: slot,
            next_embedded: slot.embedded_encoding().is_some(),
            next_dirty: false,
            self_hash,
            self_dirty: false,
        }))
    }
}

/// A leaf's value payload is itself an RLP item; a 4-element list identifies an account,
/// anything else (a plain byte string) identifies a storage value.
fn decode_leaf<F>(path_length: u8, value_item: &DecodedItem<'_>, resolve_child: &mut F) -> DecodeResult<Node>
where
    F: FnMut(ChildSlot<'_>) -> NodeReference,
{
    if value_item.is_list {
        return Err(DecodeError::UnexpectedShape { expected: "string", found: "list" });
    }
    match decode_list_items(value_item.bytes) {
        Ok(fields) if fields.len() == 4 => decode_account_leaf(path_length, &fields, resolve_child),
        _ => decode_value_leaf(path_length, value_item.bytes),
    }
}

fn decode_account_leaf<F>(path_length: u8, fields: &[DecodedItem<'_>], resolve_child: &mut F) -> DecodeResult<Node>
where
    F: FnMut(ChildSlot<'_>) -> NodeReference,
{
    if fields.iter().any(|f| f.is_list) {
        return Err(DecodeError::MalformedAccount("account fields must all be strings"));
    }
    let nonce = decode_uint64(fields[0].bytes)?;
    let balance = decode_u256(fields[1].bytes)?;
    let storage_root = decode_hash_field(fields[2].bytes)?;
    let code_hash = decode_hash_field(fields[3].bytes)?;

    let storage = if storage_root == crate::rlp::empty_trie_hash() {
        NodeReference::EMPTY
    } else {
        resolve_child(ChildSlot::Hash(storage_root))
    };

    // The address itself is not recoverable from the leaf's encoding (only the hashed
    // path is present in the trie); callers that need it supply it out of band, e.g.
    // from a preimage lookup keyed by the leaf's path. This leaf is therefore
    // constructed with a placeholder address that callers are expected to patch once
    // resolved — mirrored by `path_length` already carrying the authoritative nibble
    // count for consistency checks.
    Ok(Node::Account(Account {
        address: Address::ZERO,
        info: AccountInfo { nonce, balance, code_hash },
        storage,
        storage_hash: HashSlot::from_hash(storage_root),
        storage_embedded: false,
        storage_dirty: false,
        path_length,
        self_hash: HashSlot::ZERO,
        self_dirty: false,
    }))
}

fn decode_value_leaf(path_length: u8, bytes: &[u8]) -> DecodeResult<Node> {
    let value = decode_hash_field(bytes)?;
    Ok(Node::Value(Value {
        key: B256::ZERO,
        value,
        path_length,
        self_hash: HashSlot::ZERO,
        self_dirty: false,
    }))
}

fn decode_uint64(bytes: &[u8]) -> DecodeResult<u64> {
    if bytes.len() > 8 {
        return Err(DecodeError::FieldTooLarge(bytes.len()));
    }
    let mut buf = [0u8; 8];
    buf[8 - bytes.len()..].copy_from_slice(bytes);
    Ok(u64::from_be_bytes(buf))
}

fn decode_u256(bytes: &[u8]) -> DecodeResult<U256> {
    if bytes.len() > 32 {
        return Err(DecodeError::FieldTooLarge(bytes.len()));
    }
    Ok(U256::from_be_slice(bytes))
}

fn decode_hash_field(bytes: &[u8]) -> DecodeResult<B256> {
    if bytes.len() > 32 {
        return Err(DecodeError::FieldTooLarge(bytes.len()));
    }
    let mut buf = [0u8; 32];
    buf[32 - bytes.len()..].copy_from_slice(bytes);
    Ok(B256::from(buf))
}
