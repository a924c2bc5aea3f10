#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![no_std]

extern crate alloc;

mod nibble;
pub use nibble::{Nibble, Path};

mod node_id;
pub use node_id::{NodeId, NodeKind};

mod node_path;
pub use node_path::NodePath;

mod node;
pub use node::{Account, AccountInfo, Branch, Extension, HashSlot, Node, NodeReference, Value};

mod rlp;
pub use rlp::empty_trie_hash;

mod errors;
pub use errors::{DecodeError, DecodeResult, DiffError, DiffResult, SourceError, TrieError, TrieResult, WitnessError, WitnessResult};

mod source;
pub use source::{CancellationToken, HashAlgorithm, HashHandle, HashStorageLocation, NeverCancel, NodeSource, TrieConfig, ViewHandle, CANCELLATION_CHECK_INTERVAL};

mod decoder;
pub use decoder::{decode_embedded_from_rlp, decode_from_rlp, ChildSlot};

mod hasher;
pub use hasher::{get_hash, update_hashes};

mod witness;
pub use witness::{create_witness_proof, Proof};

mod diff;
pub use diff::{get_diff, AccountDiff, Diff};

#[cfg(feature = "std")]
mod hash_cache;
#[cfg(feature = "std")]
pub use hash_cache::{HashCache, BUCKET_COUNT};

#[cfg(test)]
mod test_util;
