//! Sharded MVCC-lite index
//!
//! Maps `(collection, doc_id)` to the latest committed `DocumentVersion`.
//! Three locking levels:
//!
//! 1. A concurrent map from collection name to per-collection index
//!    (collections are created rarely, so this is never hot).
//! 2. A fixed array of shards inside each collection, each with its own
//!    `RwLock`. A document routes to shard `doc_id % shard_count`, so
//!    worst-case contention is two documents colliding on one shard, not
//!    the whole collection.
//! 3. Shard-local read locks for gets, write locks for sets.
//!
//! Whole-collection walks copy one shard at a time under its read lock
//! and never hold all shard locks simultaneously; aggregate counts can be
//! slightly stale during concurrent mutation, which is accepted.
//!
//! Only the latest version per document is retained. A delete tombstones
//! the existing version in place; an update overwrites it with a new
//! version object. Raising the shard count lowers collision probability
//! at the cost of more lock objects per collection.

use dashmap::DashMap;
use parking_lot::RwLock;
use quill_core::{DocId, DocumentVersion, TxId};
use rustc_hash::FxHashMap;

/// Default shards per collection.
pub const DEFAULT_SHARD_COUNT: usize = 256;

struct Shard {
    map: RwLock<FxHashMap<DocId, DocumentVersion>>,
}

impl Shard {
    fn new() -> Self {
        Self {
            map: RwLock::new(FxHashMap::default()),
        }
    }
}

/// Per-collection index: a fixed array of independently locked shards.
pub struct CollectionIndex {
    shards: Vec<Shard>,
}

impl CollectionIndex {
    fn new(shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        Self {
            shards: (0..shard_count).map(|_| Shard::new()).collect(),
        }
    }

    fn shard(&self, doc_id: DocId) -> &Shard {
        &self.shards[(doc_id % self.shards.len() as u64) as usize]
    }

    /// Version visible under `snapshot`, if any.
    pub fn get(&self, doc_id: DocId, snapshot: TxId) -> Option<DocumentVersion> {
        let guard = self.shard(doc_id).map.read();
        guard
            .get(&doc_id)
            .filter(|v| v.is_visible(snapshot))
            .cloned()
    }

    /// Latest version regardless of visibility (includes tombstones).
    pub fn latest(&self, doc_id: DocId) -> Option<DocumentVersion> {
        self.shard(doc_id).map.read().get(&doc_id).cloned()
    }

    /// Publish a version, superseding any previous one for the doc id.
    pub fn set(&self, version: DocumentVersion) {
        self.shard(version.doc_id)
            .map
            .write()
            .insert(version.doc_id, version);
    }

    /// Tombstone the live version for `doc_id` at `tx`. Returns the
    /// tombstoned version, or `None` if there was no live version.
    pub fn tombstone(&self, doc_id: DocId, tx: TxId) -> Option<DocumentVersion> {
        let mut guard = self.shard(doc_id).map.write();
        let version = guard.get_mut(&doc_id)?;
        if !version.is_live() {
            return None;
        }
        version.deleted_tx = Some(tx);
        Some(version.clone())
    }

    /// Visit every version, one shard snapshot at a time.
    pub fn for_each<F: FnMut(&DocumentVersion)>(&self, mut f: F) {
        for shard in &self.shards {
            let copy: Vec<DocumentVersion> = shard.map.read().values().cloned().collect();
            for version in &copy {
                f(version);
            }
        }
    }

    /// Count of live (non-tombstoned) versions.
    pub fn live_count(&self) -> u64 {
        let mut n = 0;
        self.for_each(|v| {
            if v.is_live() {
                n += 1;
            }
        });
        n
    }

    /// Count of tombstoned versions.
    pub fn tombstoned_count(&self) -> u64 {
        let mut n = 0;
        self.for_each(|v| {
            if !v.is_live() {
                n += 1;
            }
        });
        n
    }

    /// Total entries, live and tombstoned.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.map.read().len()).sum()
    }

    /// Whether the collection holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Top-level index: collection name to sharded per-collection index.
pub struct ShardedIndex {
    collections: DashMap<String, CollectionIndex>,
    shard_count: usize,
}

impl ShardedIndex {
    /// New index; each collection gets `shard_count` shards.
    pub fn new(shard_count: usize) -> Self {
        Self {
            collections: DashMap::new(),
            shard_count,
        }
    }

    /// Create the collection's index if absent.
    pub fn ensure_collection(&self, name: &str) {
        self.collections
            .entry(name.to_string())
            .or_insert_with(|| CollectionIndex::new(self.shard_count));
    }

    /// Drop a collection's index entirely.
    pub fn drop_collection(&self, name: &str) {
        self.collections.remove(name);
    }

    /// Whether the collection exists in the index.
    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    /// Version of `doc_id` visible under `snapshot`.
    pub fn get(&self, collection: &str, doc_id: DocId, snapshot: TxId) -> Option<DocumentVersion> {
        self.collections.get(collection)?.get(doc_id, snapshot)
    }

    /// Latest version regardless of visibility.
    pub fn latest(&self, collection: &str, doc_id: DocId) -> Option<DocumentVersion> {
        self.collections.get(collection)?.latest(doc_id)
    }

    /// Publish a version, creating the collection index if needed.
    pub fn set(&self, collection: &str, version: DocumentVersion) {
        self.ensure_collection(collection);
        if let Some(index) = self.collections.get(collection) {
            index.set(version);
        }
    }

    /// Tombstone a live version. Returns the tombstoned version if one
    /// existed.
    pub fn tombstone(&self, collection: &str, doc_id: DocId, tx: TxId) -> Option<DocumentVersion> {
        self.collections.get(collection)?.tombstone(doc_id, tx)
    }

    /// Live document count for one collection.
    pub fn live_count(&self, collection: &str) -> u64 {
        self.collections
            .get(collection)
            .map(|c| c.live_count())
            .unwrap_or(0)
    }

    /// Live documents across all collections.
    pub fn live_count_all(&self) -> u64 {
        self.collections.iter().map(|c| c.live_count()).sum()
    }

    /// Tombstoned documents across all collections.
    pub fn tombstoned_count_all(&self) -> u64 {
        self.collections.iter().map(|c| c.tombstoned_count()).sum()
    }

    /// Sum of live payload lengths, for memory accounting after replay.
    pub fn live_bytes(&self) -> u64 {
        let mut total = 0u64;
        for entry in self.collections.iter() {
            entry.value().for_each(|v| {
                if v.is_live() {
                    total += v.length as u64;
                }
            });
        }
        total
    }

    /// Point-in-time copy of every collection's versions, for checkpoint
    /// snapshots.
    pub fn export(&self) -> Vec<(String, Vec<DocumentVersion>)> {
        let mut out = Vec::new();
        for entry in self.collections.iter() {
            let mut versions = Vec::new();
            entry.value().for_each(|v| versions.push(v.clone()));
            out.push((entry.key().clone(), versions));
        }
        out
    }

    /// Rebuild from an exported copy. Recovery only.
    pub fn restore(&self, collections: Vec<(String, Vec<DocumentVersion>)>) {
        for (name, versions) in collections {
            self.ensure_collection(&name);
            if let Some(index) = self.collections.get(&name) {
                for version in versions {
                    index.set(version);
                }
            }
        }
    }

    /// Visit every version of one collection.
    pub fn for_each<F: FnMut(&DocumentVersion)>(&self, collection: &str, f: F) {
        if let Some(index) = self.collections.get(collection) {
            index.for_each(f);
        }
    }
}
