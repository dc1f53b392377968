//! Transaction id sequencer
//!
//! One per logical database. Ids start at 1 and never repeat; the
//! snapshot counter is the highest id handed out so far. Index mutations
//! only happen after a commit marker is durable and are serialized by the
//! database's commit lock, so an allocated-but-uncommitted id can never
//! be observed through the index.

use quill_core::TxId;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic transaction id allocator plus commit bookkeeping.
#[derive(Debug)]
pub struct TxnSequencer {
    /// Next id to hand out.
    next: AtomicU64,
    /// Highest id with a durable commit marker.
    highest_committed: AtomicU64,
    /// Count of committed transactions since open (survives via snapshot).
    committed: AtomicU64,
}

impl TxnSequencer {
    /// New sequencer; the first allocated id is 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            highest_committed: AtomicU64::new(0),
            committed: AtomicU64::new(0),
        }
    }

    /// Allocate a fresh transaction id.
    pub fn allocate(&self) -> TxId {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// Current snapshot: the highest id allocated so far.
    pub fn snapshot(&self) -> TxId {
        self.next.load(Ordering::SeqCst) - 1
    }

    /// Record that `tx` committed durably.
    pub fn mark_committed(&self, tx: TxId) {
        self.highest_committed.fetch_max(tx, Ordering::SeqCst);
        self.committed.fetch_add(1, Ordering::SeqCst);
    }

    /// Highest committed transaction id; what checkpoint records carry.
    pub fn highest_committed(&self) -> TxId {
        self.highest_committed.load(Ordering::SeqCst)
    }

    /// Committed-transaction count.
    pub fn committed(&self) -> u64 {
        self.committed.load(Ordering::SeqCst)
    }

    /// Recovery: fast-forward past `tx` so replayed ids are never reused,
    /// and restore the committed counter.
    pub fn restore(&self, highest_tx: TxId, committed: u64) {
        self.next.fetch_max(highest_tx + 1, Ordering::SeqCst);
        self.highest_committed.fetch_max(highest_tx, Ordering::SeqCst);
        self.committed.store(committed, Ordering::SeqCst);
    }
}

impl Default for TxnSequencer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let seq = TxnSequencer::new();
        assert_eq!(seq.snapshot(), 0);
        assert_eq!(seq.allocate(), 1);
        assert_eq!(seq.allocate(), 2);
        assert_eq!(seq.snapshot(), 2);
    }

    #[test]
    fn test_commit_tracking() {
        let seq = TxnSequencer::new();
        let t1 = seq.allocate();
        let t2 = seq.allocate();
        seq.mark_committed(t2);
        seq.mark_committed(t1);
        assert_eq!(seq.highest_committed(), t2);
        assert_eq!(seq.committed(), 2);
    }

    #[test]
    fn test_restore_fast_forwards() {
        let seq = TxnSequencer::new();
        seq.restore(41, 17);
        assert_eq!(seq.allocate(), 42);
        assert_eq!(seq.committed(), 17);
        assert_eq!(seq.highest_committed(), 41);
    }

    #[test]
    fn test_concurrent_allocation_unique() {
        use std::collections::HashSet;
        use std::sync::Arc;
        let seq = Arc::new(TxnSequencer::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let s = Arc::clone(&seq);
            handles.push(std::thread::spawn(move || {
                (0..500).map(|_| s.allocate()).collect::<Vec<_>>()
            }));
        }
        let mut seen = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(seen.insert(id), "duplicate tx id {id}");
            }
        }
        assert_eq!(seen.len(), 2000);
    }
}
