//! §4.7: the diff engine. Computes an account-addressed set of changes between two trie
//! roots by walking them in lockstep, one nibble at a time, without ever materializing a
//! full copy of either side.
//!
//! The lockstep shape generalizes the same "two structures may disagree on how many
//! nibbles they consume per step" problem `kona-mpt`'s path-following code solves for a
//! single side; here both `before` and `after` get their own virtual cursor so a Branch
//! on one side can be compared directly against an Extension on the other.

use alloc::collections::BTreeMap;

use alloy_primitives::{Address, B256, U256};

use crate::errors::{DiffError, DiffResult, SourceError, TrieError};
use crate::nibble::Path;
use crate::node::{Extension, Node, NodeReference};
use crate::source::NodeSource;

fn source_err<E: core::fmt::Display>(err: E) -> DiffError {
    DiffError(TrieError::Source(SourceError::from_display(err)))
}

/// The changes made to a single account between `before` and `after`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountDiff {
    /// Set when the account existed before and does not exist after.
    pub reset: bool,
    /// Present when the nonce changed (or the account was newly created).
    pub nonce: Option<u64>,
    /// Present when the balance changed (or the account was newly created).
    pub balance: Option<U256>,
    /// Present when the code hash changed (or the account was newly created).
    pub code_hash: Option<B256>,
    /// Storage slot changes, keyed by the slot's (unhashed) key. A zero value means the
    /// slot was deleted.
    pub storage: BTreeMap<B256, B256>,
}

impl AccountDiff {
    fn added(info: crate::node::AccountInfo) -> Self {
        Self { reset: false, nonce: Some(info.nonce), balance: Some(info.balance), code_hash: Some(info.code_hash), storage: BTreeMap::new() }
    }
}

/// The full set of account-level changes between two trie roots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    /// One entry per address that changed in any way.
    pub accounts: BTreeMap<Address, AccountDiff>,
}

fn resolve<S: NodeSource>(source: &S, reference: NodeReference) -> DiffResult<Node> {
    if reference.is_empty() {
        return Ok(Node::Empty);
    }
    let view = source.get_view_access(reference).map_err(source_err)?;
    let node = view.get().clone();
    view.release();
    Ok(node)
}

fn is_terminal(node: &Node) -> bool {
    matches!(node, Node::Empty | Node::Account(_) | Node::Value(_))
}

/// Either a real node reference (whose identity can be compared cheaply) or a structure
/// synthesized purely to keep the nibble-by-nibble walk in lockstep: the remainder of an
/// extension after consuming one nibble, or a leaf carried one level deeper because its
/// own hashed path agreed with the nibble taken.
#[derive(Clone)]
enum Position {
    /// A genuine reference into the source; both sides being the same reference short-
    /// circuits the whole subtree as unchanged.
    Ref(NodeReference),
    /// A node value with no reference of its own.
    Virtual(Node),
}

impl Position {
    fn resolve<S: NodeSource>(&self, source: &S) -> DiffResult<Node> {
        match self {
            Position::Ref(r) => resolve(source, *r),
            Position::Virtual(n) => Ok(n.clone()),
        }
    }
}

fn same_position(a: &Position, b: &Position) -> bool {
    matches!((a, b), (Position::Ref(x), Position::Ref(y)) if x == y)
}

fn leaf_full_path<S: NodeSource>(source: &S, node: &Node) -> Path {
    let config = source.get_config();
    let (preimage_hash, len): (B256, usize) = match node {
        Node::Account(a) => (
            if config.use_hashed_paths {
                source.hash_address(a.address)
            } else {
                let mut padded = [0u8; 32];
                padded[12..].copy_from_slice(a.address.as_slice());
                B256::from(padded)
            },
            64,
        ),
        Node::Value(v) => (if config.use_hashed_paths { source.hash_key(v.key) } else { v.key }, 64),
        _ => unreachable!("leaf_full_path only called on Account/Value"),
    };
    Path::from_packed(preimage_hash.as_slice(), len)
}

/// Projects `pos` onto nibble `nibble` at structural `depth`, returning what lies there on
/// that side.
fn descend<S: NodeSource>(source: &S, pos: &Position, nibble: usize, depth: usize) -> DiffResult<Position> {
    let node = pos.resolve(source)?;
    match node {
        Node::Empty => Ok(Position::Ref(NodeReference::EMPTY)),
        Node::Branch(b) => Ok(Position::Ref(b.children[nibble])),
        Node::Extension(e) => {
            if e.path.get(0).value() as usize != nibble {
                return Ok(Position::Ref(NodeReference::EMPTY));
            }
            if e.path.len() == 1 {
                Ok(Position::Ref(e.next))
            } else {
                Ok(Position::Virtual(Node::Extension(Extension {
                    path: e.path.suffix(1),
                    next: e.next,
                    next_hash: e.next_hash,
                    next_embedded: e.next_embedded,
                    next_dirty: e.next_dirty,
                    self_hash: crate::node::HashSlot::ZERO,
                    self_dirty: true,
                })))
            }
        }
        leaf @ (Node::Account(_) | Node::Value(_)) => {
            let full_path = leaf_full_path(source, &leaf);
            if depth < full_path.len() && full_path.get(depth).value() as usize == nibble {
                Ok(Position::Virtual(leaf))
            } else {
                Ok(Position::Ref(NodeReference::EMPTY))
            }
        }
    }
}

fn diff_subtree<S: NodeSource>(
    source: &S,
    before: &Position,
    after: &Position,
    depth: usize,
    diff: &mut Diff,
    account_ctx: Option<Address>,
) -> DiffResult<()> {
    if same_position(before, after) {
        return Ok(());
    }
    let bn = before.resolve(source)?;
    let an = after.resolve(source)?;

    if is_terminal(&bn) && is_terminal(&an) {
        return diff_leaf_pair(source, bn, an, diff, account_ctx);
    }

    for i in 0..16usize {
        let nb = descend(source, before, i, depth)?;
        let na = descend(source, after, i, depth)?;
        diff_subtree(source, &nb, &na, depth + 1, diff, account_ctx)?;
    }
    Ok(())
}

fn diff_leaf_pair<S: NodeSource>(source: &S, before: Node, after: Node, diff: &mut Diff, account_ctx: Option<Address>) -> DiffResult<()> {
    match (before, after) {
        (Node::Empty, Node::Empty) => Ok(()),
        (Node::Empty, Node::Account(a)) => {
            diff.accounts.insert(a.address, AccountDiff::added(a.info));
            if !a.storage.is_empty() {
                diff_subtree(
                    source,
                    &Position::Ref(NodeReference::EMPTY),
                    &Position::Ref(a.storage),
                    0,
                    diff,
                    Some(a.address),
                )?;
            }
            Ok(())
        }
        (Node::Empty, Node::Value(v)) => {
            let address = account_ctx.expect("value leaf encountered outside a storage recursion");
            diff.accounts.entry(address).or_default().storage.insert(v.key, v.value);
            Ok(())
        }
        (Node::Account(a), Node::Empty) => {
            diff.accounts.entry(a.address).or_default().reset = true;
            Ok(())
        }
        (Node::Value(v), Node::Empty) => {
            let address = account_ctx.expect("value leaf encountered outside a storage recursion");
            diff.accounts.entry(address).or_default().storage.insert(v.key, B256::ZERO);
            Ok(())
        }
        (Node::Account(ba), Node::Account(aa)) => {
            if ba.address == aa.address {
                let storage_differs = ba.storage != aa.storage || ba.storage_hash != aa.storage_hash;
                {
                    let entry = diff.accounts.entry(aa.address).or_default();
                    if ba.info.nonce != aa.info.nonce {
                        entry.nonce = Some(aa.info.nonce);
                    }
                    if ba.info.balance != aa.info.balance {
                        entry.balance = Some(aa.info.balance);
                    }
                    if ba.info.code_hash != aa.info.code_hash {
                        entry.code_hash = Some(aa.info.code_hash);
                    }
                }
                if storage_differs {
                    diff_subtree(source, &Position::Ref(ba.storage), &Position::Ref(aa.storage), 0, diff, Some(aa.address))?;
                }
            } else {
                diff.accounts.entry(ba.address).or_default().reset = true;
                diff.accounts.insert(aa.address, AccountDiff::added(aa.info));
                if !aa.storage.is_empty() {
                    diff_subtree(
                        source,
                        &Position::Ref(NodeReference::EMPTY),
                        &Position::Ref(aa.storage),
                        0,
                        diff,
                        Some(aa.address),
                    )?;
                }
            }
            Ok(())
        }
        (Node::Value(bv), Node::Value(av)) => {
            let address = account_ctx.expect("value leaf encountered outside a storage recursion");
            let entry = diff.accounts.entry(address).or_default();
            if bv.key == av.key {
                if bv.value != av.value {
                    entry.storage.insert(av.key, av.value);
                }
            } else {
                entry.storage.insert(bv.key, B256::ZERO);
                entry.storage.insert(av.key, av.value);
            }
            Ok(())
        }
        (before, after) => unreachable!("non-leaf pair reached diff_leaf_pair: {before:?} vs {after:?}"),
    }
}

/// Computes the account-addressed set of changes between `before` and `after`. Never
/// mutates either tree: every access is a read (`NodeSource::get_view_access`).
pub fn get_diff<S: NodeSource>(source: &S, before: NodeReference, after: NodeReference) -> DiffResult<Diff> {
    let mut diff = Diff::default();
    diff_subtree(source, &Position::Ref(before), &Position::Ref(after), 0, &mut diff, None)?;
    Ok(diff)
}
