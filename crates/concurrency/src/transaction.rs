//! Explicit multi-operation transactions
//!
//! A `Transaction` buffers a sequence of operations under one id. Nothing
//! touches the WAL, data file, or index until commit, when the logical
//! database writes every buffered record, then one commit marker, then
//! applies the index mutations, all under the transaction's single id,
//! so the whole batch becomes visible at one snapshot boundary.
//!
//! This is the opt-in atomicity path. Singleton Create/Update/Delete
//! calls each mint their own id and commit independently; three singleton
//! calls are three visibility points, the same three operations in one
//! explicit transaction are one.

use crate::sequencer::TxnSequencer;
use chrono::{DateTime, Utc};
use quill_core::{DocId, OpType, TxId};
use std::sync::atomic::{AtomicU64, Ordering};

/// One buffered operation awaiting commit.
#[derive(Debug, Clone)]
pub struct PendingOp {
    /// Operation kind (Create, Update, or Delete).
    pub op: OpType,
    /// Target collection.
    pub collection: String,
    /// Target document.
    pub doc_id: DocId,
    /// Document payload (empty for Delete).
    pub payload: Vec<u8>,
}

/// An open explicit transaction.
#[derive(Debug)]
pub struct Transaction {
    /// Transaction id; every record in the batch commits under it.
    pub id: TxId,
    /// Snapshot the transaction started from.
    pub snapshot: TxId,
    /// Start time.
    pub started_at: DateTime<Utc>,
    ops: Vec<PendingOp>,
}

impl Transaction {
    /// Buffer a create.
    pub fn create(&mut self, collection: &str, doc_id: DocId, payload: Vec<u8>) {
        self.stage(OpType::Create, collection, doc_id, payload);
    }

    /// Buffer an update.
    pub fn update(&mut self, collection: &str, doc_id: DocId, payload: Vec<u8>) {
        self.stage(OpType::Update, collection, doc_id, payload);
    }

    /// Buffer a delete.
    pub fn delete(&mut self, collection: &str, doc_id: DocId) {
        self.stage(OpType::Delete, collection, doc_id, Vec::new());
    }

    fn stage(&mut self, op: OpType, collection: &str, doc_id: DocId, payload: Vec<u8>) {
        self.ops.push(PendingOp {
            op,
            collection: collection.to_string(),
            doc_id,
            payload,
        });
    }

    /// Buffered operations in staging order.
    pub fn ops(&self) -> &[PendingOp] {
        &self.ops
    }

    /// Whether nothing was staged.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Consume the transaction, yielding its operations.
    pub fn into_ops(self) -> Vec<PendingOp> {
        self.ops
    }
}

/// Creates transactions and tracks lifecycle metrics.
#[derive(Debug, Default)]
pub struct TransactionManager {
    started: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
}

impl TransactionManager {
    /// New manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a transaction: allocate its id and capture the snapshot it
    /// reads from.
    pub fn begin(&self, sequencer: &TxnSequencer) -> Transaction {
        let id = sequencer.allocate();
        self.started.fetch_add(1, Ordering::Relaxed);
        Transaction {
            id,
            snapshot: id - 1,
            started_at: Utc::now(),
            ops: Vec::new(),
        }
    }

    /// Record a successful commit.
    pub fn record_commit(&self) {
        self.committed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rollback.
    pub fn record_rollback(&self) {
        self.rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    /// Transactions begun since open.
    pub fn started(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }

    /// Transactions committed since open.
    pub fn committed(&self) -> u64 {
        self.committed.load(Ordering::Relaxed)
    }

    /// Transactions rolled back since open.
    pub fn rolled_back(&self) -> u64 {
        self.rolled_back.load(Ordering::Relaxed)
    }
}
