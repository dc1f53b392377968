//! Logical database
//!
//! One `LogicalDatabase` owns everything for a single database: the
//! append-only data file, the WAL, the checkpoint manager, the MVCC
//! index, the collection registry, and the transaction sequencer.
//!
//! # Commit pipeline
//!
//! Every mutation, singleton or batched, follows the same two-phase
//! discipline under the commit lock:
//!
//! 1. Durable phase: payload appended to the data file, WAL record
//!    appended, then the commit marker appended (fsync per policy).
//! 2. Visible phase: index and registry mutated, sequencer advanced.
//!
//! Nothing becomes visible before its commit marker exists, so a crash
//! at any point either replays the transaction in full (marker present)
//! or discards it entirely (marker absent).
//!
//! Singleton operations mint one transaction id each; an explicit
//! `Transaction` applies its whole batch under a single id, so the batch
//! becomes visible at one snapshot boundary.

use crate::healing::{CorruptionReport, HealingService};
use parking_lot::Mutex;
use quill_concurrency::{
    CollectionMeta, CollectionRegistry, PendingOp, ShardedIndex, Transaction, TransactionManager,
    TxnSequencer,
};
use quill_core::{
    apply_patch, normalize_collection, DbId, DocId, DocumentVersion, EngineConfig, Error, OpType,
    PatchOp, Result, TxId, DEFAULT_COLLECTION,
};
use quill_durability::{replay, CheckpointManager, CollectionSnapshot, IndexSnapshot, WalRecord, WalWriter};
use quill_storage::{DataFile, MemoryQuota};
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Point-in-time statistics for one database.
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    /// Committed transactions since open (restored across restarts).
    pub total_txns: u64,
    /// WAL bytes on disk, active segment plus rotated.
    pub wal_size: u64,
    /// Live payload bytes charged against the memory quota.
    pub memory_used: u64,
    /// Live (non-tombstoned) documents.
    pub docs_live: u64,
    /// Tombstoned documents still indexed.
    pub docs_tombstoned: u64,
    /// WAL records re-applied during the last recovery.
    pub replayed_records: u64,
    /// Corrupt documents found by reads or the healing scanner.
    pub corruption_events: u64,
}

/// One open logical database.
pub struct LogicalDatabase {
    id: DbId,
    name: String,
    config: EngineConfig,
    data: DataFile,
    wal: WalWriter,
    checkpoints: CheckpointManager,
    index: ShardedIndex,
    registry: CollectionRegistry,
    sequencer: TxnSequencer,
    txns: TransactionManager,
    /// Per-database quota; the global quota is shared via the pool.
    quota: MemoryQuota,
    global_quota: Arc<MemoryQuota>,
    /// Serializes the durable and visible phases of every commit.
    commit_lock: Mutex<()>,
    closed: AtomicBool,
    replayed: u64,
    corruption_events: AtomicU64,
    healing: Mutex<Option<HealingService>>,
}

impl LogicalDatabase {
    /// Open (recovering if necessary) the database named `name`.
    ///
    /// Recovery order: load the checkpoint snapshot, re-apply committed
    /// WAL records past the boundary, recount the registry, fast-forward
    /// the sequencer, then charge live bytes against both quotas.
    pub fn open(
        id: DbId,
        name: &str,
        config: &EngineConfig,
        global_quota: Arc<MemoryQuota>,
    ) -> Result<Arc<Self>> {
        let wal_dir = &config.wal.dir;
        let snap_path = wal_dir.join(format!("{name}.snap"));
        let outcome = replay(wal_dir, name, &snap_path)?;

        let data = DataFile::open(config.db.data_dir.join(format!("{name}.data")))?;
        let index = ShardedIndex::new(config.db.index_shards);
        let registry = CollectionRegistry::new();
        let sequencer = TxnSequencer::new();

        let mut committed = 0u64;
        if let Some(snapshot) = &outcome.snapshot {
            committed = snapshot.committed_txns;
            for coll in &snapshot.collections {
                registry.restore(&coll.name, coll.created_at, coll.doc_count);
                index.ensure_collection(&coll.name);
                for version in &coll.versions {
                    index.set(&coll.name, version.clone());
                }
            }
        }

        let mut replayed_txs: FxHashSet<TxId> = FxHashSet::default();
        for record in &outcome.records {
            replayed_txs.insert(record.tx_id);
            Self::apply_replayed(&data, &index, &registry, record)?;
        }
        // Registry counts drift while records are re-applied; recount
        // from the index, which is authoritative
        for meta in registry.list() {
            registry.restore(&meta.name, meta.created_at, index.live_count(&meta.name));
        }
        registry.ensure(DEFAULT_COLLECTION);
        index.ensure_collection(DEFAULT_COLLECTION);

        sequencer.restore(outcome.highest_tx, committed + replayed_txs.len() as u64);

        let wal = WalWriter::open(
            wal_dir,
            name,
            config.wal.fsync,
            config.wal.max_segment_bytes(),
        )?;
        let checkpoints = CheckpointManager::new(snap_path, &config.wal);

        let quota = MemoryQuota::new(config.memory.per_db_bytes());
        let live = index.live_bytes();
        quota.set_used(live);
        global_quota.add_used(live);

        if !outcome.records.is_empty() {
            info!(
                db = name,
                replayed = outcome.records.len(),
                "recovered database from WAL"
            );
        }

        let db = Arc::new(Self {
            id,
            name: name.to_string(),
            config: config.clone(),
            data,
            wal,
            checkpoints,
            index,
            registry,
            sequencer,
            txns: TransactionManager::new(),
            quota,
            global_quota,
            commit_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
            replayed: outcome.records.len() as u64,
            corruption_events: AtomicU64::new(0),
            healing: Mutex::new(None),
        });
        if config.healing.enabled {
            *db.healing.lock() =
                Some(HealingService::start(Arc::downgrade(&db), config.healing.clone()));
        }
        Ok(db)
    }

    fn apply_replayed(
        data: &DataFile,
        index: &ShardedIndex,
        registry: &CollectionRegistry,
        record: &WalRecord,
    ) -> Result<()> {
        match record.op {
            OpType::Create | OpType::Update | OpType::Patch => {
                // Re-append for a fresh offset; the old bytes stay in the
                // file but the index only points at the new record
                let (offset, length) = data.append(&record.payload)?;
                registry.ensure(&record.collection);
                index.set(
                    &record.collection,
                    DocumentVersion::new(record.doc_id, record.tx_id, offset, length),
                );
            }
            OpType::Delete => {
                index.tombstone(&record.collection, record.doc_id, record.tx_id);
            }
            OpType::CreateCollection => {
                registry.ensure(&record.collection);
                index.ensure_collection(&record.collection);
            }
            OpType::DeleteCollection => {
                registry.remove_unchecked(&record.collection);
                index.drop_collection(&record.collection);
            }
            OpType::Read | OpType::Commit | OpType::Checkpoint => {}
        }
        Ok(())
    }

    /// Database id.
    pub fn id(&self) -> DbId {
        self.id
    }

    /// Database name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// WAL records re-applied during the last recovery.
    pub fn replayed_records(&self) -> u64 {
        self.replayed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(Error::DatabaseClosed)
        } else {
            Ok(())
        }
    }

    fn reserve(&self, bytes: u64) -> Result<()> {
        self.global_quota.reserve(bytes)?;
        if let Err(e) = self.quota.reserve(bytes) {
            self.global_quota.release(bytes);
            return Err(e);
        }
        Ok(())
    }

    fn release(&self, bytes: u64) {
        self.quota.release(bytes);
        self.global_quota.release(bytes);
    }

    /// Create a document. Fails if a live version already exists.
    pub fn create(&self, collection: &str, doc_id: DocId, payload: &[u8]) -> Result<()> {
        self.ensure_open()?;
        let collection = normalize_collection(collection);
        validate_document(payload)?;
        self.reserve(payload.len() as u64)?;
        let result = self.commit_create(collection, doc_id, payload);
        if result.is_err() {
            self.release(payload.len() as u64);
        }
        result?;
        self.maybe_checkpoint();
        Ok(())
    }

    fn commit_create(&self, collection: &str, doc_id: DocId, payload: &[u8]) -> Result<()> {
        let _commit = self.commit_lock.lock();
        if self
            .index
            .latest(collection, doc_id)
            .map_or(false, |v| v.is_live())
        {
            return Err(Error::AlreadyExists {
                collection: collection.to_string(),
                doc_id,
            });
        }
        self.registry.ensure(collection);
        self.index.ensure_collection(collection);

        let tx = self.sequencer.allocate();
        let (offset, length) = self.data.append(payload)?;
        self.wal.append(&WalRecord::new(
            tx,
            self.id,
            collection,
            doc_id,
            OpType::Create,
            payload.to_vec(),
        ))?;
        self.wal.append_commit(tx, self.id)?;

        self.index
            .set(collection, DocumentVersion::new(doc_id, tx, offset, length));
        self.registry.incr(collection);
        self.sequencer.mark_committed(tx);
        Ok(())
    }

    /// Read the visible version of a document.
    ///
    /// Corruption is surfaced as an error, never masked as not-found;
    /// when read-triggered healing is on, the document is also reported
    /// to the healing service.
    pub fn read(&self, collection: &str, doc_id: DocId) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let collection = normalize_collection(collection);
        if !self.registry.contains(collection) {
            return Err(Error::CollectionNotFound(collection.to_string()));
        }
        let snapshot = self.sequencer.snapshot();
        let version = self
            .index
            .get(collection, doc_id, snapshot)
            .ok_or_else(|| Error::DocumentNotFound {
                collection: collection.to_string(),
                doc_id,
            })?;
        match self.data.read_at(version.offset, version.length) {
            Ok(bytes) => Ok(bytes),
            Err(e @ Error::Corruption(_)) => {
                self.corruption_events.fetch_add(1, Ordering::Relaxed);
                if self.config.healing.heal_on_read_corruption {
                    self.report_corruption(collection, doc_id);
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Replace a document's payload. Fails if no live version exists.
    pub fn update(&self, collection: &str, doc_id: DocId, payload: &[u8]) -> Result<()> {
        self.ensure_open()?;
        let collection = normalize_collection(collection);
        validate_document(payload)?;
        self.reserve(payload.len() as u64)?;
        match self.commit_replace(OpType::Update, collection, doc_id, payload.to_vec()) {
            Ok(superseded) => {
                self.release(superseded as u64);
                self.maybe_checkpoint();
                Ok(())
            }
            Err(e) => {
                self.release(payload.len() as u64);
                Err(e)
            }
        }
    }

    /// Write a new version for an existing live document, returning the
    /// superseded payload length.
    fn commit_replace(
        &self,
        op: OpType,
        collection: &str,
        doc_id: DocId,
        payload: Vec<u8>,
    ) -> Result<u32> {
        let _commit = self.commit_lock.lock();
        let previous = self
            .index
            .latest(collection, doc_id)
            .filter(|v| v.is_live())
            .ok_or_else(|| Error::DocumentNotFound {
                collection: collection.to_string(),
                doc_id,
            })?;

        let tx = self.sequencer.allocate();
        let (offset, length) = self.data.append(&payload)?;
        self.wal
            .append(&WalRecord::new(tx, self.id, collection, doc_id, op, payload))?;
        self.wal.append_commit(tx, self.id)?;

        self.index
            .set(collection, DocumentVersion::new(doc_id, tx, offset, length));
        self.sequencer.mark_committed(tx);
        Ok(previous.length)
    }

    /// Tombstone a document. The payload bytes stay in the data file.
    pub fn delete(&self, collection: &str, doc_id: DocId) -> Result<()> {
        self.ensure_open()?;
        let collection = normalize_collection(collection);
        let freed = {
            let _commit = self.commit_lock.lock();
            let version = self
                .index
                .latest(collection, doc_id)
                .filter(|v| v.is_live())
                .ok_or_else(|| Error::DocumentNotFound {
                    collection: collection.to_string(),
                    doc_id,
                })?;

            let tx = self.sequencer.allocate();
            self.wal.append(&WalRecord::new(
                tx,
                self.id,
                collection,
                doc_id,
                OpType::Delete,
                Vec::new(),
            ))?;
            self.wal.append_commit(tx, self.id)?;

            self.index.tombstone(collection, doc_id, tx);
            self.registry.decr(collection);
            self.sequencer.mark_committed(tx);
            version.length
        };
        self.release(freed as u64);
        self.maybe_checkpoint();
        Ok(())
    }

    /// Apply patch ops to a document and persist the result, returning
    /// the patched payload.
    ///
    /// The WAL record carries the full patched document, so replay never
    /// needs to re-run patch logic. Patch is read-modify-write: a
    /// concurrent update between the read and the commit is superseded.
    pub fn patch(&self, collection: &str, doc_id: DocId, patch_bytes: &[u8]) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let collection = normalize_collection(collection);
        let ops: Vec<PatchOp> = serde_json::from_slice(patch_bytes)
            .map_err(|e| Error::InvalidPatch(e.to_string()))?;

        let current = self.read(collection, doc_id)?;
        let mut doc: Value = serde_json::from_slice(&current)?;
        apply_patch(&mut doc, &ops)?;
        let payload = serde_json::to_vec(&doc)?;

        self.reserve(payload.len() as u64)?;
        match self.commit_replace(OpType::Patch, collection, doc_id, payload.clone()) {
            Ok(superseded) => {
                self.release(superseded as u64);
                self.maybe_checkpoint();
                Ok(payload)
            }
            Err(e) => {
                self.release(payload.len() as u64);
                Err(e)
            }
        }
    }

    /// Begin an explicit transaction.
    pub fn begin(&self) -> Result<Transaction> {
        self.ensure_open()?;
        Ok(self.txns.begin(&self.sequencer))
    }

    /// Commit an explicit transaction: every staged operation becomes
    /// durable under the transaction's single id, then visible at once.
    ///
    /// The whole batch is validated before any durable work; a batch
    /// that fails validation leaves no trace.
    pub fn commit(&self, tx: Transaction) -> Result<()> {
        self.ensure_open()?;
        let id = tx.id;
        if tx.is_empty() {
            self.sequencer.mark_committed(id);
            self.txns.record_commit();
            return Ok(());
        }
        let ops = tx.into_ops();

        let mut reserve_bytes = 0u64;
        for op in &ops {
            match op.op {
                OpType::Create | OpType::Update => {
                    validate_document(&op.payload)?;
                    reserve_bytes += op.payload.len() as u64;
                }
                OpType::Delete => {}
                other => {
                    return Err(Error::InvalidOperation(format!(
                        "{other:?} cannot be staged in a transaction"
                    )))
                }
            }
        }
        self.reserve(reserve_bytes)?;

        match self.commit_batch(id, &ops) {
            Ok(freed) => {
                self.release(freed);
                self.txns.record_commit();
                self.maybe_checkpoint();
                Ok(())
            }
            Err(e) => {
                self.release(reserve_bytes);
                self.txns.record_rollback();
                Err(e)
            }
        }
    }

    fn commit_batch(&self, tx: TxId, ops: &[PendingOp]) -> Result<u64> {
        #[derive(Clone, Copy)]
        enum Staged {
            Live(u32),
            Dead,
        }

        let _commit = self.commit_lock.lock();

        // Validate against current state plus earlier ops in the batch
        let mut overlay: FxHashMap<(String, DocId), Staged> = FxHashMap::default();
        let mut freed = 0u64;
        for op in ops {
            let collection = normalize_collection(&op.collection);
            let key = (collection.to_string(), op.doc_id);
            let existing = overlay.get(&key).copied().or_else(|| {
                self.index.latest(collection, op.doc_id).map(|v| {
                    if v.is_live() {
                        Staged::Live(v.length)
                    } else {
                        Staged::Dead
                    }
                })
            });
            match op.op {
                OpType::Create => {
                    if matches!(existing, Some(Staged::Live(_))) {
                        return Err(Error::AlreadyExists {
                            collection: collection.to_string(),
                            doc_id: op.doc_id,
                        });
                    }
                    overlay.insert(key, Staged::Live(op.payload.len() as u32));
                }
                OpType::Update => match existing {
                    Some(Staged::Live(length)) => {
                        freed += length as u64;
                        overlay.insert(key, Staged::Live(op.payload.len() as u32));
                    }
                    _ => {
                        return Err(Error::DocumentNotFound {
                            collection: collection.to_string(),
                            doc_id: op.doc_id,
                        })
                    }
                },
                OpType::Delete => match existing {
                    Some(Staged::Live(length)) => {
                        freed += length as u64;
                        overlay.insert(key, Staged::Dead);
                    }
                    _ => {
                        return Err(Error::DocumentNotFound {
                            collection: collection.to_string(),
                            doc_id: op.doc_id,
                        })
                    }
                },
                other => {
                    return Err(Error::InvalidOperation(format!(
                        "{other:?} cannot be staged in a transaction"
                    )))
                }
            }
        }

        // Durable phase: every record, then one commit marker
        enum Applied {
            Put { offset: u64, length: u32 },
            Tombstone,
        }
        let mut staged = Vec::with_capacity(ops.len());
        for op in ops {
            let collection = normalize_collection(&op.collection).to_string();
            let applied = match op.op {
                OpType::Create | OpType::Update => {
                    let (offset, length) = self.data.append(&op.payload)?;
                    Applied::Put { offset, length }
                }
                _ => Applied::Tombstone,
            };
            self.wal.append(&WalRecord::new(
                tx,
                self.id,
                &collection,
                op.doc_id,
                op.op,
                op.payload.clone(),
            ))?;
            staged.push((collection, op.doc_id, op.op, applied));
        }
        self.wal.append_commit(tx, self.id)?;

        // Visible phase
        for (collection, doc_id, op, applied) in staged {
            match applied {
                Applied::Put { offset, length } => {
                    if op == OpType::Create {
                        self.registry.ensure(&collection);
                        self.index.ensure_collection(&collection);
                        self.registry.incr(&collection);
                    }
                    self.index
                        .set(&collection, DocumentVersion::new(doc_id, tx, offset, length));
                }
                Applied::Tombstone => {
                    self.index.tombstone(&collection, doc_id, tx);
                    self.registry.decr(&collection);
                }
            }
        }
        self.sequencer.mark_committed(tx);
        Ok(freed)
    }

    /// Abandon a transaction. Nothing was durable, so this only updates
    /// metrics.
    pub fn rollback(&self, _tx: Transaction) {
        self.txns.record_rollback();
    }

    /// Explicitly create a collection.
    pub fn create_collection(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        if name.is_empty() {
            return Err(Error::InvalidOperation(
                "collection name must not be empty".into(),
            ));
        }
        let _commit = self.commit_lock.lock();
        if self.registry.contains(name) {
            return Err(Error::CollectionExists(name.to_string()));
        }

        let tx = self.sequencer.allocate();
        self.wal
            .append(&WalRecord::create_collection(tx, self.id, name))?;
        self.wal.append_commit(tx, self.id)?;

        self.registry.create(name)?;
        self.index.ensure_collection(name);
        self.sequencer.mark_committed(tx);
        Ok(())
    }

    /// Delete an empty collection. The default collection cannot be
    /// deleted.
    pub fn delete_collection(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        if name == DEFAULT_COLLECTION {
            return Err(Error::InvalidOperation(
                "the default collection cannot be deleted".into(),
            ));
        }
        let _commit = self.commit_lock.lock();
        match self.registry.doc_count(name) {
            None => return Err(Error::CollectionNotFound(name.to_string())),
            Some(n) if n > 0 => return Err(Error::CollectionNotEmpty(name.to_string())),
            Some(_) => {}
        }

        let tx = self.sequencer.allocate();
        self.wal
            .append(&WalRecord::delete_collection(tx, self.id, name))?;
        self.wal.append_commit(tx, self.id)?;

        self.registry.remove_unchecked(name);
        self.index.drop_collection(name);
        self.sequencer.mark_committed(tx);
        Ok(())
    }

    /// All collections, unordered.
    pub fn collections(&self) -> Vec<CollectionMeta> {
        self.registry.list()
    }

    /// Current statistics.
    pub fn stats(&self) -> DatabaseStats {
        DatabaseStats {
            total_txns: self.sequencer.committed(),
            wal_size: self.wal.size_on_disk(),
            memory_used: self.quota.used(),
            docs_live: self.index.live_count_all(),
            docs_tombstoned: self.index.tombstoned_count_all(),
            replayed_records: self.replayed,
            corruption_events: self.corruption_events.load(Ordering::Relaxed),
        }
    }

    /// Write a checkpoint now: snapshot the index, append the checkpoint
    /// record, and trim old WAL segments.
    pub fn checkpoint(&self) -> Result<()> {
        self.ensure_open()?;
        let _commit = self.commit_lock.lock();
        let snapshot = self.build_snapshot();
        self.checkpoints.run(&self.wal, self.id, &snapshot)
    }

    fn build_snapshot(&self) -> IndexSnapshot {
        let mut collections = Vec::new();
        for meta in self.registry.list() {
            let mut versions = Vec::new();
            self.index.for_each(&meta.name, |v| versions.push(v.clone()));
            collections.push(CollectionSnapshot {
                name: meta.name,
                created_at: meta.created_at,
                doc_count: meta.doc_count,
                versions,
            });
        }
        IndexSnapshot {
            highest_tx: self.sequencer.highest_committed(),
            committed_txns: self.sequencer.committed(),
            collections,
        }
    }

    fn maybe_checkpoint(&self) {
        if self.config.wal.checkpoint_auto && self.checkpoints.due(self.wal.total_appended()) {
            if let Err(e) = self.checkpoint() {
                warn!(db = %self.name, error = %e, "automatic checkpoint failed");
            }
            return;
        }
        // Checkpoints rotate on their own; the segment cap still holds
        // when automatic checkpoints are off or not yet due
        if self.wal.should_rotate() {
            if let Err(e) = self.wal.rotate() {
                warn!(db = %self.name, error = %e, "WAL rotation failed");
            }
        }
    }

    fn report_corruption(&self, collection: &str, doc_id: DocId) {
        if let Some(healing) = &*self.healing.lock() {
            healing.report(CorruptionReport {
                collection: collection.to_string(),
                doc_id,
            });
        }
    }

    /// Verify one document's stored bytes. Returns false (and counts a
    /// corruption event) when the record fails its checks.
    pub fn verify_document(&self, collection: &str, doc_id: DocId) -> bool {
        let Some(version) = self
            .index
            .latest(collection, doc_id)
            .filter(|v| v.is_live())
        else {
            return true;
        };
        match self.data.read_at(version.offset, version.length) {
            Ok(_) => true,
            Err(e) => {
                self.corruption_events.fetch_add(1, Ordering::Relaxed);
                error!(
                    db = %self.name,
                    collection,
                    doc_id,
                    error = %e,
                    "corrupt document detected"
                );
                false
            }
        }
    }

    /// Verify up to `max_batch` live documents, returning how many were
    /// corrupt. Driven by the healing service on its scan interval.
    pub fn scan_for_corruption(&self, max_batch: usize) -> u64 {
        let mut checked = 0usize;
        let mut corrupt = 0u64;
        for meta in self.registry.list() {
            let mut targets = Vec::new();
            self.index.for_each(&meta.name, |v| {
                if v.is_live() {
                    targets.push(v.doc_id);
                }
            });
            for doc_id in targets {
                if checked >= max_batch {
                    return corrupt;
                }
                checked += 1;
                if !self.verify_document(&meta.name, doc_id) {
                    corrupt += 1;
                }
            }
        }
        corrupt
    }

    /// Close the database: stop healing, write a final checkpoint, sync
    /// everything. Idempotent; later operations fail with
    /// `DatabaseClosed`.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(mut healing) = self.healing.lock().take() {
            healing.stop();
        }
        let result = self.flush_for_close();
        // The global reservation goes away even when the flush fails;
        // this database no longer holds any of it
        self.global_quota.release(self.quota.used());
        info!(db = %self.name, "database closed");
        result
    }

    fn flush_for_close(&self) -> Result<()> {
        let _commit = self.commit_lock.lock();
        let snapshot = self.build_snapshot();
        if let Err(e) = self.checkpoints.run(&self.wal, self.id, &snapshot) {
            warn!(db = %self.name, error = %e, "final checkpoint failed");
        }
        self.data.sync()?;
        self.wal.close()
    }
}

/// A document must be non-empty, well-formed JSON.
fn validate_document(payload: &[u8]) -> Result<()> {
    if payload.is_empty() {
        return Err(Error::InvalidJson("empty payload".into()));
    }
    serde_json::from_slice::<Value>(payload)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_document() {
        assert!(validate_document(br#"{"a":1}"#).is_ok());
        assert!(validate_document(b"[1,2,3]").is_ok());
        assert!(matches!(
            validate_document(b""),
            Err(Error::InvalidJson(_))
        ));
        assert!(matches!(
            validate_document(b"{not json"),
            Err(Error::InvalidJson(_))
        ));
    }
}
