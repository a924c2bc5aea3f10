//! §4.4: recomputing and caching node hashes.
//!
//! [`update_hashes`] walks dirty subtrees bottom-up using an explicit stack instead of
//! recursion, so depth is bounded only by available memory rather than call-stack size —
//! the same trade kona-mpt's `TrieNode::blind` avoids needing by working top-down on an
//! already-fully-resolved in-memory tree; here nodes are resolved lazily through a
//! [NodeSource], so an explicit stack is what lets a single node be visited exactly twice
//! (once to discover dirty children, once to fold them into its own encoding) without
//! recursion depth tracking it for us.
//!
//! A node's `self_hash` always stores the *candidate* representation for use inside its
//! parent's encoding: a real Keccak-256 hash, or — when the node's own RLP encoding is
//! under 32 bytes — that raw encoding itself (§4.3). The true digest of a node, regardless
//! of whether it happens to be small enough to embed, is always `Keccak256(rlp(node))`;
//! [`get_hash`] derives that on demand rather than caching two representations per node.

use alloc::vec::Vec;

use alloy_primitives::{keccak256, B256};

use crate::errors::{SourceError, TrieError, TrieResult};
use crate::nibble::Path;
use crate::node::{Account, Branch, Extension, HashSlot, Node, NodeReference, Value};
use crate::node_path::NodePath;
use crate::rlp::{empty_trie_hash, encode_compact_path, encode_hash, encode_list, encode_uint_be};
use crate::source::NodeSource;

fn source_err<E: core::fmt::Display>(err: E) -> TrieError {
    TrieError::Source(SourceError::from_display(err))
}

enum StackFrame {
    Descend { reference: NodeReference, path: NodePath },
    Ascend { reference: NodeReference, path: NodePath },
}

/// Ensures every dirty node's hash beneath `root` (inclusive) is recomputed and cached,
/// then returns `root`'s own post-recompute [HashSlot] (its parent-facing representation —
/// see module docs for why this isn't yet the same thing as its true digest).
pub fn update_hashes<S: NodeSource>(source: &S, root: NodeReference) -> TrieResult<HashSlot> {
    if root.is_empty() {
        return Ok(HashSlot::from_hash(empty_trie_hash()));
    }

    let mut stack = alloc::vec![StackFrame::Descend { reference: root, path: NodePath::root() }];
    let mut root_slot = None;

    while let Some(frame) = stack.pop() {
        match frame {
            StackFrame::Descend { reference, path } => {
                let view = source.get_view_access(reference).map_err(source_err)?;
                let dirty = view.get().is_self_dirty();
                if !dirty {
                    view.release();
                    continue;
                }
                let children = dirty_children(view.get(), &path);
                view.release();

                stack.push(StackFrame::Ascend { reference, path: path.clone() });
                for (child_ref, child_path) in children {
                    stack.push(StackFrame::Descend { reference: child_ref, path: child_path });
                }
            }
            StackFrame::Ascend { reference, path } => {
                let mut handle = source.get_hash_access(reference).map_err(source_err)?;
                recompute_self_hash(source, handle.get_mut(), &path)?;
                let slot = *handle.get().self_hash().expect("non-empty node always has a hash slot");
                handle.release();
                if reference == root {
                    root_slot = Some(slot);
                }
            }
        }
    }

    Ok(root_slot.expect("root's Ascend frame always runs"))
}

/// Returns `reference`'s true digest, recomputing any stale hashes along the way.
/// Equivalent to `update_hashes` followed by un-embedding the result if necessary.
pub fn get_hash<S: NodeSource>(source: &S, reference: NodeReference) -> TrieResult<B256> {
    if reference.is_empty() {
        return Ok(empty_trie_hash());
    }
    let slot = update_hashes(source, reference)?;
    Ok(match slot.embedded_encoding() {
        Some(encoded) => keccak256(encoded),
        None => slot.as_hash(),
    })
}

/// Which children of a dirty node themselves need a recompute pass, paired with their
/// structural path.
fn dirty_children(node: &Node, path: &NodePath) -> Vec<(NodeReference, NodePath)> {
    let mut out = Vec::new();
    match node {
        Node::Empty | Node::Value(_) => {}
        Node::Branch(b) => {
            for i in 0..16 {
                if b.dirty_mask & (1 << i) != 0 && !b.children[i].is_empty() {
                    out.push((b.children[i], path.child(crate::nibble::Nibble::new(i as u8))));
                }
            }
        }
        Node::Extension(e) => {
            if e.next_dirty && !e.next.is_empty() {
                out.push((e.next, path.next()));
            }
        }
        Node::Account(a) => {
            if a.storage_dirty && !a.storage.is_empty() {
                out.push((a.storage, path.next()));
            }
        }
    }
    out
}

/// Folds a node's (already-fresh) children's cached hashes into its own RLP encoding and
/// refreshes `self_hash`/`self_dirty`. Assumes every child this node depends on has already
/// been visited (guaranteed by `update_hashes`'s stack order).
fn recompute_self_hash<S: NodeSource>(source: &S, node: &mut Node, path: &NodePath) -> TrieResult<()> {
    match node {
        Node::Empty => return Ok(()),
        Node::Branch(b) => refresh_branch_children(source, b)?,
        Node::Extension(e) => refresh_extension_child(source, e)?,
        Node::Account(a) => refresh_account_storage(source, a)?,
        Node::Value(_) => {}
    }
    let encoded = encode_node(source, node, path.depth());

    let slot = if encoded.len() < 32 {
        HashSlot::embed(&encoded)
    } else {
        HashSlot::from_hash(keccak256(&encoded))
    };

    match node {
        Node::Empty => unreachable!(),
        Node::Branch(b) => {
            b.self_hash = slot;
            b.self_dirty = false;
        }
        Node::Extension(e) => {
            e.self_hash = slot;
            e.self_dirty = false;
        }
        Node::Account(a) => {
            a.self_hash = slot;
            a.self_dirty = false;
        }
        Node::Value(v) => {
            v.self_hash = slot;
            v.self_dirty = false;
        }
    }
    Ok(())
}

/// Pulls a (possibly just-refreshed) child's hash out of its own cached self-hash slot,
/// mirroring it into the parent's per-child cache slot the way the parent would if it had
/// recomputed it directly.
fn pull_child_slot<S: NodeSource>(source: &S, child: NodeReference) -> TrieResult<HashSlot> {
    if child.is_empty() {
        return Ok(HashSlot::ZERO);
    }
    let view = source.get_view_access(child).map_err(source_err)?;
    let slot = *view.get().self_hash().expect("non-empty child always has a hash slot");
    view.release();
    Ok(slot)
}

/// Emits the RLP item for a child slot: the raw spliced encoding if embedded, or a
/// 32-byte hash string otherwise.
fn child_item(slot: HashSlot) -> Vec<u8> {
    match slot.embedded_encoding() {
        Some(encoded) => encoded.to_vec(),
        None => {
            let mut out = Vec::new();
            encode_hash(&slot.as_hash(), &mut out);
            out
        }
    }
}

/// RLP encoding of the canonical empty string — the 17th ("value") slot of every branch
/// in this crate, since fixed-length hashed paths mean a branch can never itself
/// terminate a key (invariant 4).
const EMPTY_BRANCH_VALUE: [u8; 1] = [crate::rlp::EMPTY_STRING_RLP];

/// Pulls a dirty child's slot from the source and writes it into the parent's
/// corresponding per-child cache fields, clearing the dirty bit.
fn refresh_branch_children<S: NodeSource>(source: &S, b: &mut Branch) -> TrieResult<()> {
    for i in 0..16 {
        if b.dirty_mask & (1 << i) == 0 {
            continue;
        }
        let fresh = pull_child_slot(source, b.children[i])?;
        b.child_hashes[i] = fresh;
        if fresh.embedded_encoding().is_some() {
            b.embedded_mask |= 1 << i;
        } else {
            b.embedded_mask &= !(1 << i);
        }
        b.dirty_mask &= !(1 << i);
    }
    Ok(())
}

fn refresh_extension_child<S: NodeSource>(source: &S, e: &mut Extension) -> TrieResult<()> {
    if e.next_dirty {
        let fresh = pull_child_slot(source, e.next)?;
        e.next_hash = fresh;
        e.next_embedded = fresh.embedded_encoding().is_some();
        e.next_dirty = false;
    }
    Ok(())
}

fn refresh_account_storage<S: NodeSource>(source: &S, a: &mut Account) -> TrieResult<()> {
    if a.storage_dirty {
        let fresh = pull_child_slot(source, a.storage)?;
        a.storage_hash = fresh;
        a.storage_embedded = fresh.embedded_encoding().is_some();
        a.storage_dirty = false;
    }
    Ok(())
}

/// Encodes a node to its current RLP bytes, assuming its cached per-child hash slots are
/// already fresh (true of every node `update_hashes` has visited, and of any node reached
/// only after `get_hash` on an ancestor has already completed).
pub(crate) fn encode_node<S: NodeSource>(source: &S, node: &Node, depth: usize) -> Vec<u8> {
    match node {
        Node::Empty => alloc::vec![crate::rlp::EMPTY_STRING_RLP],
        Node::Branch(b) => encode_branch(b),
        Node::Extension(e) => encode_extension(e),
        Node::Account(a) => encode_account(source, a, depth),
        Node::Value(v) => encode_value(source, v, depth),
    }
}

fn encode_branch(b: &Branch) -> Vec<u8> {
    let mut items = Vec::with_capacity(17);
    for i in 0..16 {
        items.push(if b.children[i].is_empty() {
            alloc::vec![crate::rlp::EMPTY_STRING_RLP]
        } else {
            child_item(b.child_hashes[i])
        });
    }
    items.push(EMPTY_BRANCH_VALUE.to_vec());
    let mut out = Vec::new();
    encode_list(&items, &mut out);
    out
}

fn encode_extension(e: &Extension) -> Vec<u8> {
    let path_item = {
        let mut out = Vec::new();
        crate::rlp::encode_byte_string(&encode_compact_path(&e.path, false), &mut out);
        out
    };
    let child = child_item(e.next_hash);
    let mut out = Vec::new();
    encode_list(&[path_item, child], &mut out);
    out
}

fn encode_account<S: NodeSource>(source: &S, a: &Account, depth: usize) -> Vec<u8> {
    // A trie root is always referenced by its true digest, never by an embedded
    // encoding (§4.3) — and every account's storage trie root is, by definition, a
    // root of its own sub-trie, so the account RLP always carries a real 32-byte hash
    // for storageRoot even when the storage trie happens to be tiny enough to embed.
    let storage_root = match a.storage_hash.embedded_encoding() {
        Some(encoded) => keccak256(encoded),
        None if a.storage.is_empty() => empty_trie_hash(),
        None => a.storage_hash.as_hash(),
    };

    let mut nonce_item = Vec::new();
    encode_uint_be(&a.info.nonce.to_be_bytes(), &mut nonce_item);
    let mut balance_item = Vec::new();
    encode_uint_be(&a.info.balance.to_be_bytes::<32>(), &mut balance_item);
    let mut storage_item = Vec::new();
    encode_hash(&storage_root, &mut storage_item);
    let mut code_item = Vec::new();
    encode_hash(&a.info.code_hash, &mut code_item);

    let mut account_rlp = Vec::new();
    encode_list(&[nonce_item, balance_item, storage_item, code_item], &mut account_rlp);

    let suffix = leaf_suffix(source, a.address.as_slice(), depth, a.path_length as usize, true);
    let mut path_item = Vec::new();
    crate::rlp::encode_byte_string(&encode_compact_path(&suffix, true), &mut path_item);

    let mut value_item = Vec::new();
    crate::rlp::encode_byte_string(&account_rlp, &mut value_item);

    let mut out = Vec::new();
    encode_list(&[path_item, value_item], &mut out);
    out
}

fn encode_value<S: NodeSource>(source: &S, v: &Value, depth: usize) -> Vec<u8> {
    let suffix = leaf_suffix(source, v.key.as_slice(), depth, v.path_length as usize, false);

    let mut path_item = Vec::new();
    crate::rlp::encode_byte_string(&encode_compact_path(&suffix, true), &mut path_item);

    let mut value_rlp = Vec::new();
    encode_uint_be(v.value.as_slice(), &mut value_rlp);
    let mut value_item = Vec::new();
    crate::rlp::encode_byte_string(&value_rlp, &mut value_item);

    let mut out = Vec::new();
    encode_list(&[path_item, value_item], &mut out);
    out
}

/// Computes a leaf's remaining compact-path suffix: either the Keccak hash of `key_bytes`
/// (the normal, hashed-path mode) or the raw bytes zero-extended to 32, sliced from the
/// current structural depth onward.
fn leaf_suffix<S: NodeSource>(source: &S, key_bytes: &[u8], depth: usize, expected_len: usize, is_address: bool) -> Path {
    let cfg = source.get_config();
    let full: B256 = if cfg.use_hashed_paths {
        if is_address {
            source.hash_address(alloy_primitives::Address::from_slice(key_bytes))
        } else {
            source.hash_key(B256::from_slice(key_bytes))
        }
    } else {
        let mut padded = [0u8; 32];
        padded[32 - key_bytes.len()..].copy_from_slice(key_bytes);
        B256::from(padded)
    };
    let suffix = Path::from_packed(full.as_slice(), 64).suffix(depth);
    debug_assert_eq!(suffix.len(), expected_len, "path_length out of sync with structural depth");
    suffix
}
