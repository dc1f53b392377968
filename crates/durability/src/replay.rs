//! Crash recovery: WAL reading and replay
//!
//! Replay rebuilds the committed state of one database:
//!
//! 1. Load the index snapshot, if a checkpoint wrote one.
//! 2. Scan every WAL segment, rotated first (oldest to newest), then the
//!    active file. A torn tail ends the scan of that file; a bad CRC in
//!    the middle is corruption and fails recovery.
//! 3. Collect the set of tx ids with a commit marker. Records of
//!    transactions without a marker were durable but never committed and
//!    are discarded.
//! 4. Keep committed mutation records appearing after the last
//!    Checkpoint record in log order. The boundary is positional, not
//!    id-based: transaction ids are allocated at begin time, so a
//!    transaction committed after the checkpoint can carry a lower id
//!    than transactions inside the snapshot. The snapshot covers exactly
//!    what was logged before the checkpoint record, so log position is
//!    the correct cut.
//!
//! The outcome is handed to the engine, which re-applies the surviving
//! records on top of the snapshot.

use crate::checkpoint::{load_snapshot, IndexSnapshot};
use crate::record::WalRecord;
use quill_core::{Result, TxId};
use rustc_hash::FxHashSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Reads records from every segment of one database's WAL.
pub struct WalReader {
    /// Segment paths in replay order: rotated ascending, then active.
    paths: Vec<PathBuf>,
}

impl WalReader {
    /// Open a reader over `<dir>/<name>.wal` and its rotated segments.
    pub fn open<P: AsRef<Path>>(dir: P, name: &str) -> Result<Self> {
        let dir = dir.as_ref();
        let prefix = format!("{name}.wal.");
        let mut rotated: Vec<(u64, PathBuf)> = Vec::new();
        if dir.exists() {
            for entry in std::fs::read_dir(dir)? {
                let entry = entry?;
                let file_name = entry.file_name();
                if let Some(rest) = file_name.to_string_lossy().strip_prefix(&prefix) {
                    if let Ok(number) = rest.parse::<u64>() {
                        rotated.push((number, entry.path()));
                    }
                }
            }
        }
        rotated.sort_by_key(|(n, _)| *n);

        let mut paths: Vec<PathBuf> = rotated.into_iter().map(|(_, p)| p).collect();
        let active = dir.join(format!("{name}.wal"));
        if active.exists() {
            paths.push(active);
        }
        Ok(Self { paths })
    }

    /// Read every record across all segments, in append order.
    ///
    /// A torn record at the end of a file is tolerated (the crash
    /// interrupted that append); the remaining bytes are dropped and the
    /// scan moves to the next segment. Corruption mid-file is an error.
    pub fn read_all(&self) -> Result<Vec<WalRecord>> {
        let mut records = Vec::new();
        for path in &self.paths {
            let mut bytes = Vec::new();
            std::fs::File::open(path)?.read_to_end(&mut bytes)?;
            let mut cursor = 0;
            while cursor < bytes.len() {
                match WalRecord::decode(&bytes[cursor..])? {
                    Some((record, consumed)) => {
                        records.push(record);
                        cursor += consumed;
                    }
                    None => {
                        warn!(
                            path = %path.display(),
                            leftover = bytes.len() - cursor,
                            "torn record at WAL tail, dropping"
                        );
                        break;
                    }
                }
            }
        }
        Ok(records)
    }

    /// Segment paths in replay order.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

/// What recovery produced.
pub struct ReplayOutcome {
    /// Index snapshot from the last checkpoint, if any.
    pub snapshot: Option<IndexSnapshot>,
    /// Committed mutation records logged after the last checkpoint
    /// record, in log order.
    pub records: Vec<WalRecord>,
    /// Highest tx id observed anywhere (snapshot, markers, or records);
    /// seeds the transaction sequencer.
    pub highest_tx: TxId,
    /// Number of distinct committed transactions seen in the log.
    pub committed: u64,
}

/// Recover one database's committed state from its snapshot and WAL.
pub fn replay<P: AsRef<Path>>(dir: P, name: &str, snap_path: &Path) -> Result<ReplayOutcome> {
    let snapshot = load_snapshot(snap_path)?;
    let all = WalReader::open(dir, name)?.read_all()?;

    let mut committed_txs: FxHashSet<TxId> = FxHashSet::default();
    let mut highest_tx: TxId = snapshot.as_ref().map_or(0, |s| s.highest_tx);
    // Position of the last Checkpoint record; everything before it in
    // log order lives in the snapshot
    let mut checkpoint_pos: Option<usize> = None;

    for (pos, record) in all.iter().enumerate() {
        highest_tx = highest_tx.max(record.tx_id);
        match record.op {
            quill_core::OpType::Commit => {
                committed_txs.insert(record.tx_id);
            }
            quill_core::OpType::Checkpoint => {
                checkpoint_pos = Some(pos);
            }
            _ => {}
        }
    }

    let total = all.len();
    let records: Vec<WalRecord> = all
        .into_iter()
        .enumerate()
        .filter(|(pos, r)| {
            r.op.is_mutation()
                && committed_txs.contains(&r.tx_id)
                && checkpoint_pos.map_or(true, |c| *pos > c)
        })
        .map(|(_, r)| r)
        .collect();

    debug!(
        wal = name,
        scanned = total,
        replayable = records.len(),
        checkpoint = ?checkpoint_pos,
        highest_tx,
        "WAL replay scan complete"
    );

    Ok(ReplayOutcome {
        snapshot,
        records,
        highest_tx,
        committed: committed_txs.len() as u64,
    })
}
