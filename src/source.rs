//! §6's consumed interface: the `NodeSource`/node manager capability the core reads
//! through. Node storage, allocation and persistence live entirely on the other side of
//! this trait — out of scope per §1.

use core::fmt::{Debug, Display};

use alloy_primitives::{Address, B256};

use crate::node::{Node, NodeReference};

/// The hash function used for the trie's external-facing root. Only `Keccak256` is
/// supported today (§1's non-goal), but the config seam is left open the way
/// `kona-mpt`'s `TrieProvider`/`TrieDBFetcher` leave the preimage source itself
/// pluggable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// Keccak-256, the only supported algorithm.
    Keccak256,
}

/// Where a node's own hash is cached: inside the node itself, or only inside its
/// parent's per-child slot. See §4.9 and SPEC_FULL.md §3.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashStorageLocation {
    /// The node carries its own `self_hash`/`self_dirty`, authoritative on its own.
    WithNode,
    /// Only the parent's cached child-hash slot is authoritative; a clean `self_hash`
    /// on the child does not by itself guarantee the parent's embedded bit is correct,
    /// so the hasher must recompute the embedded flag on every descent in this mode.
    WithParent,
}

/// Host-provided configuration for a trie instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrieConfig {
    /// The hash function backing the external root (§1: Keccak-256 only).
    pub hashing_algorithm: HashAlgorithm,
    /// Whether account/value leaves address by the Keccak hash of the address/key
    /// (standard Ethereum state/storage tries) rather than the raw key.
    pub use_hashed_paths: bool,
    /// Where per-node hashes are authoritative. See [HashStorageLocation].
    pub hash_storage_location: HashStorageLocation,
}

impl Default for TrieConfig {
    fn default() -> Self {
        Self {
            hashing_algorithm: HashAlgorithm::Keccak256,
            use_hashed_paths: true,
            hash_storage_location: HashStorageLocation::WithNode,
        }
    }
}

/// A read-only access handle to a node. Many may be held concurrently.
pub trait ViewHandle {
    /// Reads the node.
    fn get(&self) -> &Node;
    /// Releases the handle. Implementations should also release on `Drop`, so this is
    /// safe to skip on an error path — it exists for callers that want to release
    /// early.
    fn release(self);
}

/// A handle granting mutation of a node's hash/embedded/dirty bookkeeping fields only
/// (never its structural content). Exclusive per node.
pub trait HashHandle {
    /// Reads the node.
    fn get(&self) -> &Node;
    /// Mutates the node's hash/embedded/dirty fields.
    fn get_mut(&mut self) -> &mut Node;
    /// Releases the handle. See [ViewHandle::release].
    fn release(self);
}

/// The capability the core consumes to resolve references into nodes, read host
/// configuration, and hash addresses/keys (possibly cache-backed on the host side).
pub trait NodeSource {
    /// The error type surfaced by this source. Propagated unchanged by the core (§6:
    /// "Errors from the source are surfaced and stop the current operation").
    type Error: Display + Debug;
    /// Concrete [ViewHandle] type.
    type View: ViewHandle;
    /// Concrete [HashHandle] type.
    type Hash: HashHandle;

    /// Acquires read-only access to the node addressed by `reference`.
    fn get_view_access(&self, reference: NodeReference) -> Result<Self::View, Self::Error>;

    /// Acquires hash-mutation access to the node addressed by `reference`.
    fn get_hash_access(&self, reference: NodeReference) -> Result<Self::Hash, Self::Error>;

    /// Returns the host's configuration for this trie instance.
    fn get_config(&self) -> TrieConfig;

    /// Computes (possibly cache-backed) `Keccak256(address)`.
    fn hash_address(&self, address: Address) -> B256;

    /// Computes (possibly cache-backed) `Keccak256(key)`.
    fn hash_key(&self, key: B256) -> B256;
}

/// A token checked periodically during long traversals (§5: "Verification loops and
/// visitor-driven traversals check a cancellation token every 100 visits").
pub trait CancellationToken {
    /// Whether cancellation has been requested.
    fn is_cancelled(&self) -> bool;
}

/// A [CancellationToken] that never cancels. The default for callers with no
/// cancellation story of their own.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancel;

impl CancellationToken for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// How many visits a traversal performs between cancellation checks (§5).
pub const CANCELLATION_CHECK_INTERVAL: usize = 100;
