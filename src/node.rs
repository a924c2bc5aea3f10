//! The five-variant [Node] model: Empty / Branch / Extension / Account / Value, plus the
//! bookkeeping ([HashSlot], per-child dirty/embedded bits) the hasher needs.

use alloy_primitives::{Address, B256, U256};

use crate::nibble::Path;
use crate::node_id::NodeId;

/// A 32-byte slot that holds either a real Keccak-256 hash, or — when the child it
/// belongs to is [embedded](crate::rlp) — that child's RLP encoding followed by a
/// `0x0F` terminal marker byte, with everything after the marker zeroed. See §4.3.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashSlot(pub [u8; 32]);

/// Marker byte written immediately after an embedded child's encoding within its
/// [HashSlot]. Every byte after it must be zero.
pub const EMBEDDED_TERMINATOR: u8 = 0x0F;

impl core::fmt::Debug for HashSlot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "HashSlot(0x{})", alloy_primitives::hex::encode(self.0))
    }
}

impl Default for HashSlot {
    fn default() -> Self {
        Self::ZERO
    }
}

impl HashSlot {
    /// The zero slot. Used both as "not yet computed" and as the canonical hash of an
    /// embedded node (§4.3: "The hash of an embedded node is defined as zero").
    pub const ZERO: Self = Self([0u8; 32]);

    /// Builds a slot holding a real Keccak-256 hash.
    pub fn from_hash(hash: B256) -> Self {
        Self(hash.0)
    }

    /// Interprets the slot's bytes as a hash (only meaningful when the child is not
    /// embedded).
    pub fn as_hash(&self) -> B256 {
        B256::from(self.0)
    }

    /// Whether every byte of the slot is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Repurposes the slot to carry `encoded` (an embedded child's RLP encoding)
    /// followed by the terminal marker. Panics if `encoded.len() >= 32`.
    pub fn embed(encoded: &[u8]) -> Self {
        assert!(encoded.len() < 32, "embedded encoding must be < 32 bytes");
        let mut bytes = [0u8; 32];
        bytes[..encoded.len()].copy_from_slice(encoded);
        bytes[encoded.len()] = EMBEDDED_TERMINATOR;
        Self(bytes)
    }

    /// If this slot carries an embedded encoding, returns it. Scans from the end of the
    /// buffer for the first non-zero byte: by construction everything strictly after the
    /// terminal marker is zero, so the first non-zero byte found walking backward is
    /// always the marker itself, regardless of what bytes the real encoding contains.
    /// Returns `None` (and not an error) when the slot is entirely zero, since that's
    /// indistinguishable from "no embedded payload ever written".
    pub fn embedded_encoding(&self) -> Option<&[u8]> {
        let idx = (0..32).rev().find(|&i| self.0[i] != 0)?;
        if self.0[idx] != EMBEDDED_TERMINATOR {
            return None;
        }
        Some(&self.0[..idx])
    }
}

/// A pair of a [NodeId] and an opaque, possibly-populated cache slot. Callers treat this
/// as an identity-carrying handle that a `NodeSource` can resolve to a [Node].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeReference {
    /// The node's identity within the external manager's arena.
    pub id: NodeId,
    /// An opaque, possibly-stale cached hash for this reference, if one was already
    /// known at the point the reference was taken.
    pub cached_hash: Option<HashSlot>,
}

impl NodeReference {
    /// The canonical empty reference.
    pub const EMPTY: Self = Self { id: NodeId::EMPTY, cached_hash: None };

    /// Builds a fresh reference with no precomputed hash.
    pub const fn new(id: NodeId) -> Self {
        Self { id, cached_hash: None }
    }

    /// Whether this reference addresses the empty node.
    pub const fn is_empty(&self) -> bool {
        self.id.is_empty()
    }
}

/// The non-structural fields of a state-trie account: everything besides the address
/// (which lives on the [Node::Account] variant) and the storage trie (referenced
/// separately so it can be lazily resolved).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccountInfo {
    /// Transaction count sent from this account.
    pub nonce: u64,
    /// Wei balance.
    pub balance: U256,
    /// Hash of the account's contract code (zero for externally-owned accounts).
    pub code_hash: B256,
}

impl AccountInfo {
    /// An account must never be persisted with all-zero info (§3: "empty accounts must
    /// never be stored").
    pub fn is_empty(&self) -> bool {
        self.nonce == 0 && self.balance.is_zero() && self.code_hash.is_zero()
    }
}

/// A 16-way branch node.
#[derive(Debug, Clone)]
pub struct Branch {
    /// References to the 16 children (an empty child uses [NodeReference::EMPTY]).
    pub children: [NodeReference; 16],
    /// Cached hash (or embedded encoding) of each child.
    pub child_hashes: [HashSlot; 16],
    /// Bit `i` set means child `i`'s cached hash slot holds an embedded encoding rather
    /// than a real hash.
    pub embedded_mask: u16,
    /// Bit `i` set means child `i`'s cached hash is stale and must be refreshed before
    /// this branch's own hash can be recomputed.
    pub dirty_mask: u16,
    /// This branch's own cached hash (or embedded encoding, if embedded under its own
    /// parent).
    pub self_hash: HashSlot,
    /// Whether `self_hash` is stale.
    pub self_dirty: bool,
}

impl Branch {
    /// Number of non-empty children. Per invariant 1, a well-formed branch has at least
    /// two.
    pub fn non_empty_children(&self) -> usize {
        self.children.iter().filter(|c| !c.is_empty()).count()
    }
}

/// A path-compression node standing in for a chain of single-child branches.
#[derive(Debug, Clone)]
pub struct Extension {
    /// The shared path, 1..=63 nibbles (invariant 2).
    pub path: Path,
    /// Reference to the sole child. Must not be empty and must not itself be an
    /// extension (invariant 2 — adjacent extensions merge).
    pub next: NodeReference,
    /// Cached hash (or embedded encoding) of `next`.
    pub next_hash: HashSlot,
    /// Whether `next`'s cached hash slot holds an embedded encoding.
    pub next_embedded: bool,
    /// Whether `next_hash` is stale.
    pub next_dirty: bool,
    /// This node's own cached hash (or embedded encoding).
    pub self_hash: HashSlot,
    /// Whether `self_hash` is stale.
    pub self_dirty: bool,
}

/// A state-trie leaf holding one account's record and a reference to its storage trie.
#[derive(Debug, Clone)]
pub struct Account {
    /// The account's 20-byte address.
    pub address: Address,
    /// Nonce / balance / code hash.
    pub info: AccountInfo,
    /// Reference to the root of this account's storage trie (empty if the account has
    /// no storage).
    pub storage: NodeReference,
    /// Cached hash (or embedded encoding) of the storage trie root.
    pub storage_hash: HashSlot,
    /// Whether `storage`'s cached hash slot holds an embedded encoding.
    pub storage_embedded: bool,
    /// Whether `storage_hash` is stale.
    pub storage_dirty: bool,
    /// Nibbles of the hashed address still represented below this structural position
    /// (invariant 4).
    pub path_length: u8,
    /// This node's own cached hash (or embedded encoding).
    pub self_hash: HashSlot,
    /// Whether `self_hash` is stale.
    pub self_dirty: bool,
}

/// A storage-trie leaf holding one 32-byte key/value pair.
#[derive(Debug, Clone)]
pub struct Value {
    /// The storage slot's 32-byte key.
    pub key: B256,
    /// The storage slot's 32-byte value.
    pub value: B256,
    /// Nibbles of the hashed key still represented below this structural position
    /// (invariant 4).
    pub path_length: u8,
    /// This node's own cached hash (or embedded encoding).
    pub self_hash: HashSlot,
    /// Whether `self_hash` is stale.
    pub self_dirty: bool,
}

/// A node within the authenticated trie.
#[derive(Debug, Clone)]
pub enum Node {
    /// The canonical empty node. Never has a hash of its own beyond the fixed
    /// `Keccak(Rlp(""))` constant, and is never itself marked dirty.
    Empty,
    /// 16-way branch.
    Branch(Branch),
    /// Path-compressing pointer node.
    Extension(Extension),
    /// State-trie account leaf.
    Account(Account),
    /// Storage-trie value leaf.
    Value(Value),
}

impl Node {
    /// Whether this node is [Node::Empty].
    pub const fn is_empty(&self) -> bool {
        matches!(self, Node::Empty)
    }

    /// This node's own cached hash slot, or `None` for [Node::Empty] (whose hash is the
    /// fixed empty-string constant, not a per-instance cached value).
    pub fn self_hash(&self) -> Option<&HashSlot> {
        match self {
            Node::Empty => None,
            Node::Branch(b) => Some(&b.self_hash),
            Node::Extension(e) => Some(&e.self_hash),
            Node::Account(a) => Some(&a.self_hash),
            Node::Value(v) => Some(&v.self_hash),
        }
    }

    /// Whether this node's own hash is stale. [Node::Empty] is never dirty.
    pub const fn is_self_dirty(&self) -> bool {
        match self {
            Node::Empty => false,
            Node::Branch(b) => b.self_dirty,
            Node::Extension(e) => e.self_dirty,
            Node::Account(a) => a.self_dirty,
            Node::Value(v) => v.self_dirty,
        }
    }
}
