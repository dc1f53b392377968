//! WAL writer with group commit and segment rotation
//!
//! One writer per logical database. Records are appended to the active
//! segment `<name>.wal`; rotation renames it to `<name>.wal.N` and opens
//! a fresh active file.
//!
//! # Fsync policies
//!
//! - `Always`: fsync after every record.
//! - `Group` (DEFAULT): one fsync per batch. The batch closes when either
//!   the record cap is reached (checked on append) or the interval
//!   elapses (a background flusher thread). This amortizes the fsync cost
//!   across every writer that appended into the batch.
//! - `Interval`: fsync purely on the flusher's timer.
//! - `Disabled`: never fsync. Benchmark-only; `sync()` still works when
//!   called explicitly (checkpoints rely on it).
//!
//! Every append flushes the buffered writer to OS buffers so readers and
//! replay always see complete records; fsync is the only deferred step.

use crate::record::WalRecord;
use crate::tracker::ErrorTracker;
use parking_lot::Mutex;
use quill_core::{DbId, Error, FsyncPolicy, Result, RetryPolicy, TxId};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

struct ActiveSegment {
    writer: BufWriter<File>,
    /// Number the active file takes when it is next rotated out.
    next_segment: u64,
}

struct WalInner {
    path: PathBuf,
    file: Mutex<ActiveSegment>,
    /// Active segment size, drives rotation.
    active_size: AtomicU64,
    /// Bytes appended since open, drives checkpoint-interval decisions.
    total_appended: AtomicU64,
    /// Records since the last fsync (group mode batch counter).
    pending_fsync: AtomicU64,
    last_fsync: Mutex<Instant>,
    tracker: ErrorTracker,
    retry: RetryPolicy,
}

impl WalInner {
    /// Flush buffered bytes and fsync, resetting the batch counter.
    fn sync(&self) -> Result<()> {
        let result = self.retry.run(|| {
            let mut guard = self.file.lock();
            guard.writer.flush()?;
            guard.writer.get_ref().sync_all()?;
            Ok(())
        });
        match result {
            Ok(()) => {
                self.pending_fsync.store(0, Ordering::SeqCst);
                *self.last_fsync.lock() = Instant::now();
                Ok(())
            }
            Err(e) => {
                self.tracker.record(&e);
                Err(e)
            }
        }
    }
}

/// Append-only WAL writer for one logical database.
pub struct WalWriter {
    dir: PathBuf,
    name: String,
    inner: Arc<WalInner>,
    policy: FsyncPolicy,
    max_segment_bytes: u64,
    flusher: Mutex<Option<JoinHandle<()>>>,
    shutdown: Arc<AtomicBool>,
}

impl WalWriter {
    /// Open or create `<dir>/<name>.wal` with the given fsync policy.
    ///
    /// Existing rotated segments are detected so rotation numbering
    /// continues where it left off. Group and Interval policies spawn a
    /// background flusher thread.
    pub fn open<P: AsRef<Path>>(
        dir: P,
        name: &str,
        policy: FsyncPolicy,
        max_segment_bytes: u64,
    ) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{name}.wal"));

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let size = file.metadata()?.len();
        let next_segment = highest_segment(&dir, name)?.map_or(1, |n| n + 1);

        let inner = Arc::new(WalInner {
            path,
            file: Mutex::new(ActiveSegment {
                writer: BufWriter::new(file),
                next_segment,
            }),
            active_size: AtomicU64::new(size),
            total_appended: AtomicU64::new(0),
            pending_fsync: AtomicU64::new(0),
            last_fsync: Mutex::new(Instant::now()),
            tracker: ErrorTracker::new(),
            retry: RetryPolicy::default(),
        });
        let shutdown = Arc::new(AtomicBool::new(false));

        let flusher = match policy {
            FsyncPolicy::Group { interval_ms, .. } | FsyncPolicy::Interval { interval_ms } => {
                Some(spawn_flusher(
                    Arc::clone(&inner),
                    Arc::clone(&shutdown),
                    Duration::from_millis(interval_ms.max(1)),
                ))
            }
            FsyncPolicy::Always | FsyncPolicy::Disabled => None,
        };

        Ok(Self {
            dir,
            name: name.to_string(),
            inner,
            policy,
            max_segment_bytes,
            flusher: Mutex::new(flusher),
            shutdown,
        })
    }

    /// Append one record and apply the fsync policy.
    pub fn append(&self, record: &WalRecord) -> Result<()> {
        let encoded = record.encode();
        {
            let mut guard = self.inner.file.lock();
            let result = guard
                .writer
                .write_all(&encoded)
                .and_then(|_| guard.writer.flush())
                .map_err(Error::from);
            if let Err(e) = result {
                self.inner.tracker.record(&e);
                return Err(e);
            }
        }
        self.inner
            .active_size
            .fetch_add(encoded.len() as u64, Ordering::SeqCst);
        self.inner
            .total_appended
            .fetch_add(encoded.len() as u64, Ordering::SeqCst);

        match self.policy {
            FsyncPolicy::Always => self.inner.sync()?,
            FsyncPolicy::Group { batch_size, .. } => {
                let pending = self.inner.pending_fsync.fetch_add(1, Ordering::SeqCst) + 1;
                if pending >= batch_size as u64 {
                    self.inner.sync()?;
                }
            }
            // Flusher thread owns fsync; Disabled never syncs on its own
            FsyncPolicy::Interval { .. } | FsyncPolicy::Disabled => {}
        }
        Ok(())
    }

    /// Append a commit marker for `tx`. The marker participates in the
    /// configured fsync policy like any other record.
    pub fn append_commit(&self, tx: TxId, db_id: DbId) -> Result<()> {
        self.append(&WalRecord::commit(tx, db_id))
    }

    /// Append a checkpoint record carrying the highest committed tx id.
    pub fn append_checkpoint(&self, highest_committed: TxId, db_id: DbId) -> Result<()> {
        self.append(&WalRecord::checkpoint(highest_committed, db_id))
    }

    /// Flush and fsync now, regardless of policy.
    pub fn sync(&self) -> Result<()> {
        self.inner.sync()
    }

    /// Whether the active segment has reached the rotation threshold.
    pub fn should_rotate(&self) -> bool {
        self.inner.active_size.load(Ordering::SeqCst) >= self.max_segment_bytes
    }

    /// Rotate: sync, rename the active file to `<name>.wal.N`, and open a
    /// fresh active file.
    ///
    /// If the rename fails the existing handle keeps writing to the
    /// original path. If the fresh open fails the rotated file is renamed
    /// back and reopened, so the writer is never left fileless.
    pub fn rotate(&self) -> Result<()> {
        let mut guard = self.inner.file.lock();
        guard.writer.flush()?;
        guard.writer.get_ref().sync_all()?;

        let segment = guard.next_segment;
        let rotated = self.dir.join(format!("{}.wal.{}", self.name, segment));
        if let Err(e) = std::fs::rename(&self.inner.path, &rotated) {
            let err = Error::from(e);
            self.inner.tracker.record(&err);
            warn!(wal = %self.name, error = %err, "WAL rotation rename failed; keeping active segment");
            return Err(err);
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)
        {
            Ok(file) => {
                guard.writer = BufWriter::new(file);
                guard.next_segment = segment + 1;
                self.inner.active_size.store(0, Ordering::SeqCst);
                debug!(wal = %self.name, segment, "rotated WAL segment");
                Ok(())
            }
            Err(e) => {
                // Put the rotated file back so the writer has a file
                let _ = std::fs::rename(&rotated, &self.inner.path);
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.inner.path)?;
                let size = file.metadata()?.len();
                guard.writer = BufWriter::new(file);
                self.inner.active_size.store(size, Ordering::SeqCst);
                let err = Error::from(e);
                self.inner.tracker.record(&err);
                warn!(wal = %self.name, error = %err, "WAL rotation reopen failed; restored original segment");
                Err(err)
            }
        }
    }

    /// Rotated segments, oldest first.
    pub fn rotated_segments(&self) -> Result<Vec<(u64, PathBuf)>> {
        let prefix = format!("{}.wal.", self.name);
        let mut segments = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(rest) = file_name.to_string_lossy().strip_prefix(&prefix).map(String::from)
            else {
                continue;
            };
            if let Ok(number) = rest.parse::<u64>() {
                segments.push((number, entry.path()));
            }
        }
        segments.sort_by_key(|(n, _)| *n);
        Ok(segments)
    }

    /// Active segment size in bytes.
    pub fn active_size(&self) -> u64 {
        self.inner.active_size.load(Ordering::SeqCst)
    }

    /// Bytes appended since open.
    pub fn total_appended(&self) -> u64 {
        self.inner.total_appended.load(Ordering::SeqCst)
    }

    /// Active plus rotated size on disk.
    pub fn size_on_disk(&self) -> u64 {
        let rotated: u64 = self
            .rotated_segments()
            .map(|segs| {
                segs.iter()
                    .filter_map(|(_, p)| std::fs::metadata(p).ok())
                    .map(|m| m.len())
                    .sum()
            })
            .unwrap_or(0);
        self.active_size() + rotated
    }

    /// Failure counters for observability.
    pub fn error_counts(&self) -> crate::tracker::ErrorCounts {
        self.inner.tracker.counts()
    }

    /// Configured fsync policy.
    pub fn policy(&self) -> FsyncPolicy {
        self.policy
    }

    /// Stop the flusher and perform a final sync (unless fsync is
    /// disabled, in which case only the buffer is flushed).
    pub fn close(&self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.flusher.lock().take() {
            let _ = handle.join();
        }
        if matches!(self.policy, FsyncPolicy::Disabled) {
            let mut guard = self.inner.file.lock();
            guard.writer.flush()?;
            Ok(())
        } else {
            self.inner.sync()
        }
    }
}

impl Drop for WalWriter {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn spawn_flusher(
    inner: Arc<WalInner>,
    shutdown: Arc<AtomicBool>,
    interval: Duration,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("quill-wal-flush".to_string())
        .spawn(move || {
            while !shutdown.load(Ordering::SeqCst) {
                std::thread::sleep(interval);
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                if inner.pending_fsync.load(Ordering::SeqCst) > 0 {
                    // Best-effort; failures are tracked and the next
                    // explicit sync or append surfaces them
                    let _ = inner.sync();
                }
            }
        })
        .expect("failed to spawn WAL flusher thread")
}

/// Highest rotated segment number for `<name>.wal.N` files in `dir`.
fn highest_segment(dir: &Path, name: &str) -> Result<Option<u64>> {
    let prefix = format!("{name}.wal.");
    let mut highest = None;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        if let Some(rest) = file_name.to_string_lossy().strip_prefix(&prefix) {
            if let Ok(number) = rest.parse::<u64>() {
                highest = Some(highest.map_or(number, |h: u64| h.max(number)));
            }
        }
    }
    Ok(highest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::OpType;

    fn record(tx: TxId, payload: &[u8]) -> WalRecord {
        WalRecord::new(tx, 1, "c", tx, OpType::Create, payload.to_vec())
    }

    fn open(dir: &Path, policy: FsyncPolicy, max_bytes: u64) -> WalWriter {
        WalWriter::open(dir, "db", policy, max_bytes).unwrap()
    }

    #[test]
    fn test_append_tracks_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let wal = open(dir.path(), FsyncPolicy::Always, 1 << 20);
        let rec = record(1, b"abc");
        wal.append(&rec).unwrap();
        assert_eq!(wal.active_size(), rec.encoded_len() as u64);
        assert_eq!(wal.total_appended(), rec.encoded_len() as u64);
    }

    #[test]
    fn test_group_batch_cap_triggers_sync() {
        let dir = tempfile::tempdir().unwrap();
        let wal = open(
            dir.path(),
            FsyncPolicy::Group {
                interval_ms: 60_000,
                batch_size: 3,
            },
            1 << 20,
        );
        wal.append(&record(1, b"a")).unwrap();
        wal.append(&record(2, b"b")).unwrap();
        assert_eq!(wal.inner.pending_fsync.load(Ordering::SeqCst), 2);
        wal.append(&record(3, b"c")).unwrap();
        // Batch cap reached: fsync happened, counter reset
        assert_eq!(wal.inner.pending_fsync.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let wal = open(dir.path(), FsyncPolicy::Always, 64);
        while !wal.should_rotate() {
            wal.append(&record(1, b"padding-payload")).unwrap();
        }
        wal.rotate().unwrap();
        assert_eq!(wal.active_size(), 0);
        let segments = wal.rotated_segments().unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].0, 1);
        assert!(segments[0].1.exists());

        // Next rotation takes the next number
        wal.append(&record(2, b"x")).unwrap();
        wal.rotate().unwrap();
        let segments = wal.rotated_segments().unwrap();
        assert_eq!(segments.last().unwrap().0, 2);
    }

    #[test]
    fn test_numbering_continues_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let wal = open(dir.path(), FsyncPolicy::Always, 1);
            wal.append(&record(1, b"a")).unwrap();
            wal.rotate().unwrap();
        }
        let wal = open(dir.path(), FsyncPolicy::Always, 1);
        wal.append(&record(2, b"b")).unwrap();
        wal.rotate().unwrap();
        let numbers: Vec<u64> = wal
            .rotated_segments()
            .unwrap()
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn test_disabled_policy_never_spawns_flusher() {
        let dir = tempfile::tempdir().unwrap();
        let wal = open(dir.path(), FsyncPolicy::Disabled, 1 << 20);
        assert!(wal.flusher.lock().is_none());
        wal.append(&record(1, b"a")).unwrap();
        wal.close().unwrap();
    }

    #[test]
    fn test_error_counts_start_clean() {
        let dir = tempfile::tempdir().unwrap();
        let wal = open(dir.path(), FsyncPolicy::Always, 1 << 20);
        wal.append(&record(1, b"a")).unwrap();
        assert_eq!(wal.error_counts(), crate::tracker::ErrorCounts::default());
    }
}
