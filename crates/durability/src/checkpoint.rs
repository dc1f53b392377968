//! Checkpointing and WAL trimming
//!
//! A checkpoint is a durable recovery point: the whole index state is
//! written to `<name>.snap` (atomically, via temp file + rename), then a
//! checkpoint record carrying the highest committed tx id is appended
//! and synced. Replay loads the snapshot and only re-applies committed
//! records logged after the checkpoint record, so recovery time is
//! bounded by "bytes since the last checkpoint" instead of the whole WAL
//! history.
//!
//! After a checkpoint the trimmer prunes rotated segments, keeping a
//! configured number as a safety margin. Trimming is safe regardless of
//! timing: a trimmed segment only held records from before the last
//! checkpoint, which the snapshot already covers.

use crate::writer::WalWriter;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use quill_core::{DbId, DocumentVersion, Error, Result, TxId, WalConfig};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Point-in-time state of one collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSnapshot {
    /// Collection name.
    pub name: String,
    /// Creation time carried through recovery.
    pub created_at: DateTime<Utc>,
    /// Live document count at snapshot time.
    pub doc_count: u64,
    /// Every version, live and tombstoned. Offsets point into the data
    /// file, which retains all bytes (append-only).
    pub versions: Vec<DocumentVersion>,
}

/// Durable image of a database's in-memory state at checkpoint time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSnapshot {
    /// Highest committed tx id at checkpoint time; seeds the sequencer.
    pub highest_tx: TxId,
    /// Committed-transaction counter at snapshot time.
    pub committed_txns: u64,
    /// Per-collection state.
    pub collections: Vec<CollectionSnapshot>,
}

/// Creates recovery points and prunes old WAL segments.
pub struct CheckpointManager {
    snap_path: PathBuf,
    interval_bytes: u64,
    trim: bool,
    segments_kept: usize,
    /// WAL total_appended at the last checkpoint.
    last_total: AtomicU64,
    /// Serializes concurrent opportunistic checkpoint attempts.
    lock: Mutex<()>,
}

impl CheckpointManager {
    /// New manager writing snapshots to `snap_path`.
    pub fn new(snap_path: PathBuf, config: &WalConfig) -> Self {
        Self {
            snap_path,
            interval_bytes: config.checkpoint_interval_bytes(),
            trim: config.trim_after_checkpoint,
            segments_kept: config.segments_kept,
            last_total: AtomicU64::new(0),
            lock: Mutex::new(()),
        }
    }

    /// Whether enough WAL bytes have accumulated since the last
    /// checkpoint to warrant another.
    pub fn due(&self, wal_total_appended: u64) -> bool {
        wal_total_appended.saturating_sub(self.last_total.load(Ordering::SeqCst))
            >= self.interval_bytes
    }

    /// Write a recovery point: snapshot file, checkpoint record, sync,
    /// then rotation and trimming.
    pub fn run(&self, wal: &WalWriter, db_id: DbId, snapshot: &IndexSnapshot) -> Result<()> {
        let _guard = self.lock.lock();

        self.write_snapshot(snapshot)?;
        wal.append_checkpoint(snapshot.highest_tx, db_id)?;
        wal.sync()?;

        if wal.should_rotate() {
            wal.rotate()?;
        }
        if self.trim {
            self.trim_segments(wal)?;
        }
        self.last_total.store(wal.total_appended(), Ordering::SeqCst);
        debug!(
            db_id,
            highest_tx = snapshot.highest_tx,
            "checkpoint complete"
        );
        Ok(())
    }

    /// Load the snapshot, if one has been written.
    pub fn load(&self) -> Result<Option<IndexSnapshot>> {
        load_snapshot(&self.snap_path)
    }

    /// Path of the snapshot file.
    pub fn snap_path(&self) -> &Path {
        &self.snap_path
    }

    fn write_snapshot(&self, snapshot: &IndexSnapshot) -> Result<()> {
        let encoded = bincode::serialize(snapshot)
            .map_err(|e| Error::Serialization(format!("snapshot encode failed: {}", e)))?;
        let tmp = self.snap_path.with_extension("snap.tmp");
        {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(&encoded)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.snap_path)?;
        Ok(())
    }

    /// Remove rotated segments beyond the retained window, oldest first.
    fn trim_segments(&self, wal: &WalWriter) -> Result<()> {
        let segments = wal.rotated_segments()?;
        if segments.len() <= self.segments_kept {
            return Ok(());
        }
        let excess = segments.len() - self.segments_kept;
        for (number, path) in segments.into_iter().take(excess) {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(segment = number, "trimmed WAL segment"),
                Err(e) => {
                    warn!(segment = number, error = %e, "failed to trim WAL segment")
                }
            }
        }
        Ok(())
    }
}

/// Load an index snapshot from disk; `Ok(None)` when absent, an error
/// when present but undecodable.
pub fn load_snapshot(path: &Path) -> Result<Option<IndexSnapshot>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let snapshot = bincode::deserialize(&bytes)
        .map_err(|e| Error::Serialization(format!("snapshot decode failed: {}", e)))?;
    Ok(Some(snapshot))
}
