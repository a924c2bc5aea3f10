//! An in-memory [NodeSource] test double, playing the role `kona-mpt`'s
//! `NoopTrieProvider` (`noop.rs`) plays for its own (read-only, RPC-backed) provider
//! trait: a trivial, fully in-process implementation good enough to drive the rest of
//! this crate's test suites without any network or disk dependency.
//!
//! Building a trie is explicitly out of scope for the core itself (§1: "mutation of the
//! trie via this spec" is a non-goal) — node storage and allocation belong to the
//! external node manager. The `insert_*` helpers here play that external role for tests
//! only: a small from-scratch radix-insert algorithm, not part of the crate's public
//! hashing/decoding/proving/diffing surface.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;

use alloy_primitives::{keccak256, Address, B256};

use crate::nibble::Path;
use crate::node::{Account, AccountInfo, Branch, Extension, HashSlot, Node, NodeReference, Value};
use crate::node_id::{NodeId, NodeKind};
use crate::source::{HashHandle, NodeSource, TrieConfig, ViewHandle};

/// The only way an [InMemoryNodeSource] operation can fail: a reference naming a slot
/// that was never allocated. Indicates a bug in the calling test, not a real operating
/// condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InMemoryError;

impl core::fmt::Display for InMemoryError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "in-memory node source: unallocated reference")
    }
}

#[derive(Default)]
struct Arenas {
    branches: Vec<Branch>,
    extensions: Vec<Extension>,
    accounts: Vec<Account>,
    values: Vec<Value>,
}

impl Arenas {
    fn get(&self, id: NodeId) -> Node {
        match id.kind() {
            NodeKind::Empty => Node::Empty,
            NodeKind::Branch => Node::Branch(self.branches[id.index().unwrap() as usize].clone()),
            NodeKind::Extension => Node::Extension(self.extensions[id.index().unwrap() as usize].clone()),
            NodeKind::Account => Node::Account(self.accounts[id.index().unwrap() as usize].clone()),
            NodeKind::Value => Node::Value(self.values[id.index().unwrap() as usize].clone()),
        }
    }

    fn set(&mut self, id: NodeId, node: Node) {
        let idx = id.index().unwrap() as usize;
        match node {
            Node::Empty => {}
            Node::Branch(b) => self.branches[idx] = b,
            Node::Extension(e) => self.extensions[idx] = e,
            Node::Account(a) => self.accounts[idx] = a,
            Node::Value(v) => self.values[idx] = v,
        }
    }

    fn push_branch(&mut self, b: Branch) -> NodeId {
        let idx = self.branches.len() as u64;
        self.branches.push(b);
        NodeId::branch(idx)
    }

    fn push_extension(&mut self, e: Extension) -> NodeId {
        let idx = self.extensions.len() as u64;
        self.extensions.push(e);
        NodeId::extension(idx)
    }

    fn push_account(&mut self, a: Account) -> NodeId {
        let idx = self.accounts.len() as u64;
        self.accounts.push(a);
        NodeId::account(idx)
    }

    fn push_value(&mut self, v: Value) -> NodeId {
        let idx = self.values.len() as u64;
        self.values.push(v);
        NodeId::value(idx)
    }
}

/// A read-only snapshot of one node, handed out by [InMemoryNodeSource::get_view_access].
#[derive(Debug)]
pub struct InMemoryView {
    node: Node,
}

impl ViewHandle for InMemoryView {
    fn get(&self) -> &Node {
        &self.node
    }

    fn release(self) {}
}

/// A hash-mutation handle, handed out by [InMemoryNodeSource::get_hash_access]. Writes
/// its node back into the shared arena on `release()`, and also on `Drop` if the caller
/// never released explicitly — matching the RAII discipline the rest of the crate
/// assumes of every `HashHandle`.
#[derive(Debug)]
pub struct InMemoryHashHandle {
    arenas: Rc<RefCell<Arenas>>,
    id: NodeId,
    node: Node,
    written_back: bool,
}

impl InMemoryHashHandle {
    fn write_back(&mut self) {
        if self.written_back || self.id.is_empty() {
            return;
        }
        self.arenas.borrow_mut().set(self.id, self.node.clone());
        self.written_back = true;
    }
}

impl HashHandle for InMemoryHashHandle {
    fn get(&self) -> &Node {
        &self.node
    }

    fn get_mut(&mut self) -> &mut Node {
        &mut self.node
    }

    fn release(mut self) {
        self.write_back();
    }
}

impl Drop for InMemoryHashHandle {
    fn drop(&mut self) {
        self.write_back();
    }
}

/// What kind of leaf an insert is creating: carries the payload that doesn't depend on
/// where in the trie the leaf ends up landing.
enum Seed {
    Account { address: Address, info: AccountInfo },
    Value { key: B256, value: B256 },
}

fn build_leaf(seed: &Seed, path_length: u8) -> Node {
    match seed {
        Seed::Account { address, info } => Node::Account(Account {
            address: *address,
            info: *info,
            storage: NodeReference::EMPTY,
            storage_hash: HashSlot::ZERO,
            storage_embedded: false,
            storage_dirty: false,
            path_length,
            self_hash: HashSlot::ZERO,
            self_dirty: true,
        }),
        Seed::Value { key, value } => Node::Value(Value {
            key: *key,
            value: *value,
            path_length,
            self_hash: HashSlot::ZERO,
            self_dirty: true,
        }),
    }
}

fn relabel_leaf(node: Node, path_length: u8) -> Node {
    match node {
        Node::Account(mut a) => {
            a.path_length = path_length;
            a.self_dirty = true;
            a.self_hash = HashSlot::ZERO;
            Node::Account(a)
        }
        Node::Value(mut v) => {
            v.path_length = path_length;
            v.self_dirty = true;
            v.self_hash = HashSlot::ZERO;
            Node::Value(v)
        }
        other => other,
    }
}

/// An in-process [NodeSource]: every node lives directly in a shared arena behind a
/// `RefCell`, so `&self` methods can still mutate on hash recompute the way a real
/// lock-guarded manager would.
#[derive(Debug, Clone)]
pub struct InMemoryNodeSource {
    arenas: Rc<RefCell<Arenas>>,
    config: TrieConfig,
}

impl Default for InMemoryNodeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryNodeSource {
    /// An empty source using the default (hashed-paths, Keccak-256) configuration.
    pub fn new() -> Self {
        Self { arenas: Rc::new(RefCell::new(Arenas::default())), config: TrieConfig::default() }
    }

    /// An empty source with a caller-supplied configuration, e.g. to build fixtures with
    /// `use_hashed_paths: false` so the nibble path is directly controlled by the
    /// address/key bytes rather than their Keccak hash.
    pub fn with_config(config: TrieConfig) -> Self {
        Self { arenas: Rc::new(RefCell::new(Arenas::default())), config }
    }

    fn full_path_for(&self, preimage: &[u8], is_address: bool) -> Path {
        let hash = if self.config.use_hashed_paths {
            if is_address {
                self.hash_address(Address::from_slice(preimage))
            } else {
                self.hash_key(B256::from_slice(preimage))
            }
        } else {
            let mut padded = [0u8; 32];
            padded[32 - preimage.len()..].copy_from_slice(preimage);
            B256::from(padded)
        };
        Path::from_packed(hash.as_slice(), 64)
    }

    fn leaf_full_path(&self, node: &Node) -> Path {
        match node {
            Node::Account(a) => self.full_path_for(a.address.as_slice(), true),
            Node::Value(v) => self.full_path_for(v.key.as_slice(), false),
            _ => unreachable!("leaf_full_path only called on Account/Value"),
        }
    }

    fn alloc_leaf(&mut self, node: Node) -> NodeReference {
        let id = match node {
            Node::Account(a) => self.arenas.borrow_mut().push_account(a),
            Node::Value(v) => self.arenas.borrow_mut().push_value(v),
            _ => unreachable!("alloc_leaf only called with Account/Value"),
        };
        NodeReference::new(id)
    }

    fn alloc_branch(&mut self, b: Branch) -> NodeReference {
        NodeReference::new(self.arenas.borrow_mut().push_branch(b))
    }

    fn alloc_extension(&mut self, e: Extension) -> NodeReference {
        NodeReference::new(self.arenas.borrow_mut().push_extension(e))
    }

    /// Inserts by copy-on-write: every node along the path to the change gets a fresh
    /// arena slot, so a reference taken before this call keeps denoting the unmodified
    /// subtree. This is what lets a test build two distinct roots (e.g. for a diff) out
    /// of the same arena.
    fn insert_leaf(&mut self, current: NodeReference, full_path: &Path, depth: usize, seed: &Seed) -> NodeReference {
        if current.is_empty() {
            let path_length = (full_path.len() - depth) as u8;
            return self.alloc_leaf(build_leaf(seed, path_length));
        }
        let node = self.arenas.borrow().get(current.id);
        match node {
            Node::Empty => unreachable!("non-empty reference resolved to Node::Empty"),
            Node::Branch(mut b) => {
                let i = full_path.get(depth).value() as usize;
                let child = b.children[i];
                let new_child = self.insert_leaf(child, full_path, depth + 1, seed);
                b.children[i] = new_child;
                b.dirty_mask |= 1 << i;
                b.self_dirty = true;
                self.alloc_branch(b)
            }
            Node::Extension(mut e) => {
                let query_suffix = full_path.suffix(depth);
                let common = e.path.common_prefix_length(&query_suffix);
                if common == e.path.len() {
                    let new_next = self.insert_leaf(e.next, full_path, depth + e.path.len(), seed);
                    e.next = new_next;
                    e.next_dirty = true;
                    e.self_dirty = true;
                    self.alloc_extension(e)
                } else {
                    self.split_extension(e, full_path, depth, common, seed)
                }
            }
            leaf @ (Node::Account(_) | Node::Value(_)) => {
                let existing_path = self.leaf_full_path(&leaf);
                if existing_path.is_equal_to(full_path) {
                    let path_length = (full_path.len() - depth) as u8;
                    self.alloc_leaf(build_leaf(seed, path_length))
                } else {
                    self.split_leaf(leaf, &existing_path, full_path, depth, seed)
                }
            }
        }
    }

    fn split_leaf(&mut self, existing: Node, existing_path: &Path, new_path: &Path, depth: usize, seed: &Seed) -> NodeReference {
        let common = existing_path.suffix(depth).common_prefix_length(&new_path.suffix(depth));
        let branch_depth = depth + common;

        let existing_nibble = existing_path.get(branch_depth).value() as usize;
        let existing_len = (existing_path.len() - (branch_depth + 1)) as u8;
        let existing_ref = self.alloc_leaf(relabel_leaf(existing, existing_len));

        let new_nibble = new_path.get(branch_depth).value() as usize;
        let new_len = (new_path.len() - (branch_depth + 1)) as u8;
        let new_ref = self.alloc_leaf(build_leaf(seed, new_len));

        let branch_ref = self.alloc_two_child_branch(existing_nibble, existing_ref, new_nibble, new_ref);

        if common == 0 {
            branch_ref
        } else {
            let ext_path = existing_path.suffix(depth).truncated(common);
            self.alloc_extension(Extension {
                path: ext_path,
                next: branch_ref,
                next_hash: HashSlot::ZERO,
                next_embedded: false,
                next_dirty: true,
                self_hash: HashSlot::ZERO,
                self_dirty: true,
            })
        }
    }

    fn split_extension(&mut self, e: Extension, full_path: &Path, depth: usize, common: usize, seed: &Seed) -> NodeReference {
        let existing_nibble = e.path.get(common).value() as usize;
        let remainder_len = e.path.len() - common - 1;
        let existing_branch_child = if remainder_len == 0 {
            e.next
        } else {
            self.alloc_extension(Extension {
                path: e.path.suffix(common + 1),
                next: e.next,
                next_hash: HashSlot::ZERO,
                next_embedded: false,
                next_dirty: true,
                self_hash: HashSlot::ZERO,
                self_dirty: true,
            })
        };

        let new_nibble = full_path.get(depth + common).value() as usize;
        let new_len = (full_path.len() - (depth + common + 1)) as u8;
        let new_ref = self.alloc_leaf(build_leaf(seed, new_len));

        let branch_ref = self.alloc_two_child_branch(existing_nibble, existing_branch_child, new_nibble, new_ref);

        if common == 0 {
            branch_ref
        } else {
            self.alloc_extension(Extension {
                path: e.path.truncated(common),
                next: branch_ref,
                next_hash: HashSlot::ZERO,
                next_embedded: false,
                next_dirty: true,
                self_hash: HashSlot::ZERO,
                self_dirty: true,
            })
        }
    }

    fn alloc_two_child_branch(&mut self, nibble_a: usize, ref_a: NodeReference, nibble_b: usize, ref_b: NodeReference) -> NodeReference {
        debug_assert_ne!(nibble_a, nibble_b, "split must land the two children in different branch slots");
        let mut children = [NodeReference::EMPTY; 16];
        children[nibble_a] = ref_a;
        children[nibble_b] = ref_b;
        self.alloc_branch(Branch {
            children,
            child_hashes: [HashSlot::ZERO; 16],
            embedded_mask: 0,
            dirty_mask: (1 << nibble_a) | (1 << nibble_b),
            self_hash: HashSlot::ZERO,
            self_dirty: true,
        })
    }

    /// Inserts (or overwrites) an account's record into the state trie rooted at `root`,
    /// returning the new root.
    pub fn insert_account(&mut self, root: NodeReference, address: Address, info: AccountInfo) -> NodeReference {
        let full_path = self.full_path_for(address.as_slice(), true);
        self.insert_leaf(root, &full_path, 0, &Seed::Account { address, info })
    }

    /// Convenience for the common case of a single account sitting alone in a fresh
    /// state trie.
    pub fn insert_single_account(&mut self, address: Address, info: AccountInfo) -> NodeReference {
        self.insert_account(NodeReference::EMPTY, address, info)
    }

    /// Inserts (or overwrites) a storage slot into the storage trie rooted at `root`,
    /// returning the new root.
    pub fn insert_storage(&mut self, root: NodeReference, key: B256, value: B256) -> NodeReference {
        let full_path = self.full_path_for(key.as_slice(), false);
        self.insert_leaf(root, &full_path, 0, &Seed::Value { key, value })
    }

    /// Points an already-inserted account at a (possibly freshly built) storage trie
    /// root, allocating a fresh `Account` node (copy-on-write, like [Self::insert_leaf])
    /// and returning the reference to it. The old `account_ref` keeps denoting the
    /// account's prior storage pointer.
    pub fn set_account_storage(&mut self, account_ref: NodeReference, storage_root: NodeReference) -> NodeReference {
        let idx = account_ref.id.index().expect("account_ref must address a real Account node") as usize;
        let mut a = self.arenas.borrow().accounts[idx].clone();
        a.storage = storage_root;
        a.storage_dirty = true;
        a.self_dirty = true;
        self.alloc_leaf(Node::Account(a))
    }
}

impl NodeSource for InMemoryNodeSource {
    type Error = InMemoryError;
    type View = InMemoryView;
    type Hash = InMemoryHashHandle;

    fn get_view_access(&self, reference: NodeReference) -> Result<Self::View, Self::Error> {
        if reference.is_empty() {
            return Ok(InMemoryView { node: Node::Empty });
        }
        Ok(InMemoryView { node: self.arenas.borrow().get(reference.id) })
    }

    fn get_hash_access(&self, reference: NodeReference) -> Result<Self::Hash, Self::Error> {
        if reference.is_empty() {
            return Ok(InMemoryHashHandle { arenas: self.arenas.clone(), id: NodeId::EMPTY, node: Node::Empty, written_back: true });
        }
        let node = self.arenas.borrow().get(reference.id);
        Ok(InMemoryHashHandle { arenas: self.arenas.clone(), id: reference.id, node, written_back: false })
    }

    fn get_config(&self) -> TrieConfig {
        self.config
    }

    fn hash_address(&self, address: Address) -> B256 {
        keccak256(address.as_slice())
    }

    fn hash_key(&self, key: B256) -> B256 {
        keccak256(key.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::AccountInfo;
    use alloy_primitives::U256;

    #[test]
    fn single_insert_produces_account_leaf() {
        let mut source = InMemoryNodeSource::new();
        let root = source.insert_single_account(Address::repeat_byte(0x01), AccountInfo::default());
        let view = source.get_view_access(root).unwrap();
        assert!(matches!(view.get(), Node::Account(_)));
    }

    #[test]
    fn two_accounts_split_into_branch() {
        let mut source = InMemoryNodeSource::with_config(TrieConfig { use_hashed_paths: false, ..TrieConfig::default() });
        let a = Address::repeat_byte(0x01);
        let b = Address::repeat_byte(0x02);
        let root = source.insert_account(NodeReference::EMPTY, a, AccountInfo::default());
        let root = source.insert_account(root, b, AccountInfo::default());

        let view = source.get_view_access(root).unwrap();
        match view.get() {
            Node::Extension(e) => {
                let next_view = source.get_view_access(e.next).unwrap();
                assert!(matches!(next_view.get(), Node::Branch(_)));
            }
            Node::Branch(_) => {}
            other => panic!("expected Extension or Branch at the split point, got {other:?}"),
        }
    }

    #[test]
    fn overwriting_same_address_keeps_single_leaf() {
        let mut source = InMemoryNodeSource::new();
        let addr = Address::repeat_byte(0x03);
        let root = source.insert_single_account(addr, AccountInfo { nonce: 1, ..Default::default() });
        let root = source.insert_account(root, addr, AccountInfo { nonce: 2, balance: U256::from(5u64), ..Default::default() });

        let view = source.get_view_access(root).unwrap();
        match view.get() {
            Node::Account(a) => {
                assert_eq!(a.info.nonce, 2);
                assert_eq!(a.info.balance, U256::from(5u64));
            }
            other => panic!("expected Account, got {other:?}"),
        }
    }

    #[test]
    fn storage_insert_links_to_account() {
        let mut source = InMemoryNodeSource::new();
        let addr = Address::repeat_byte(0x04);
        let account_ref = source.insert_single_account(addr, AccountInfo::default());
        let storage_root = source.insert_storage(NodeReference::EMPTY, B256::repeat_byte(0x10), B256::repeat_byte(0x20));
        let account_ref = source.set_account_storage(account_ref, storage_root);

        let view = source.get_view_access(account_ref).unwrap();
        match view.get() {
            Node::Account(a) => assert_eq!(a.storage, storage_root),
            other => panic!("expected Account, got {other:?}"),
        }
    }
}
