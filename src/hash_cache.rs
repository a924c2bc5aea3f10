//! §4.8: a fixed-size, bucket-locked cache for `Keccak256(address)`/`Keccak256(key)`
//! results, shared across many [crate::source::NodeSource] calls.
//!
//! `kona-mpt` has no caching layer of its own (its provider is read-only and RPC-backed),
//! so this module's concurrency shape is grounded on the rest of the example pack instead:
//! a fixed bucket count, each behind its own `parking_lot::Mutex`, rather than one lock (or
//! a single `RwLock`) guarding the whole table — the same trade the reth/triedb lineage
//! manifests in the corpus make for a hot, read-mostly cache under concurrent access.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use alloy_primitives::{keccak256, Address, B256};
use parking_lot::Mutex;

/// Number of buckets backing the cache. Fixed per §4.8 (`2^17`).
pub const BUCKET_COUNT: usize = 1 << 17;

#[derive(Default)]
struct Bucket {
    entries: Vec<(B256, B256)>,
}

/// A concurrent cache mapping pre-image bytes to their Keccak-256 hash, bucketed by the
/// low bits of a cheap hash of the input so that unrelated lookups rarely contend on the
/// same lock.
pub struct HashCache {
    buckets: Vec<Mutex<Bucket>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl core::fmt::Debug for HashCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HashCache")
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for HashCache {
    fn default() -> Self {
        Self::new()
    }
}

fn bucket_index(preimage: &[u8]) -> usize {
    // Not a cryptographic hash: only used to spread entries across buckets.
    let mut h: u64 = 0xcbf29ce484222325;
    for &b in preimage {
        h ^= b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    (h as usize) & (BUCKET_COUNT - 1)
}

impl HashCache {
    /// Builds an empty cache with [`BUCKET_COUNT`] buckets.
    pub fn new() -> Self {
        let mut buckets = Vec::with_capacity(BUCKET_COUNT);
        buckets.resize_with(BUCKET_COUNT, Default::default);
        Self { buckets, hits: AtomicU64::new(0), misses: AtomicU64::new(0) }
    }

    fn get_or_insert(&self, preimage: &[u8]) -> B256 {
        let key = preimage_key(preimage);
        let idx = bucket_index(preimage);
        let mut bucket = self.buckets[idx].lock();
        if let Some((_, hash)) = bucket.entries.iter().find(|(k, _)| *k == key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return *hash;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let hash = keccak256(preimage);
        bucket.entries.push((key, hash));
        hash
    }

    /// Returns (possibly cache-backed) `Keccak256(address)`.
    pub fn hash_address(&self, address: Address) -> B256 {
        self.get_or_insert(address.as_slice())
    }

    /// Returns (possibly cache-backed) `Keccak256(key)`.
    pub fn hash_key(&self, key: B256) -> B256 {
        self.get_or_insert(key.as_slice())
    }

    /// Total cache hits since construction.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Total cache misses since construction.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

/// Preimages are at most 32 bytes (an `Address` or a `B256`); normalize into a `B256` so
/// the in-bucket table has a uniform key type without extra allocation.
fn preimage_key(preimage: &[u8]) -> B256 {
    let mut buf = [0u8; 32];
    buf[32 - preimage.len()..].copy_from_slice(preimage);
    B256::from(buf)
}
