//! Engine configuration, loadable from `quill.toml`
//!
//! The engine consumes this surface; it never produces it. Every knob has
//! a default so an empty file (or no file) yields a working engine. The
//! fsync policy in particular is an explicit, visible setting: group
//! commit is the single highest-leverage durability/performance trade-off
//! in the system and must never be silently altered.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file name placed in the engine data directory.
pub const CONFIG_FILE_NAME: &str = "quill.toml";

/// When the WAL calls fsync.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FsyncPolicy {
    /// fsync after every record. Safest, highest latency.
    Always,
    /// Group commit: buffer records, one fsync per batch, triggered by
    /// whichever of the interval or the batch cap elapses first. DEFAULT.
    Group {
        /// Maximum time between fsyncs in milliseconds.
        interval_ms: u64,
        /// Maximum records between fsyncs.
        batch_size: usize,
    },
    /// fsync purely on a timer, regardless of batch size.
    Interval {
        /// Time between fsyncs in milliseconds.
        interval_ms: u64,
    },
    /// Never fsync. Benchmark-only; unsafe for real data.
    #[serde(rename = "none")]
    Disabled,
}

impl Default for FsyncPolicy {
    fn default() -> Self {
        FsyncPolicy::Group {
            interval_ms: 1,
            batch_size: 100,
        }
    }
}

/// WAL settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalConfig {
    /// Directory holding `<db>.wal`, rotated segments, and `<db>.snap`.
    pub dir: PathBuf,
    /// Rotate the active segment once it reaches this size.
    pub max_segment_mb: u64,
    /// Fsync policy.
    pub fsync: FsyncPolicy,
    /// Checkpoint once this many megabytes have been logged since the
    /// last checkpoint.
    pub checkpoint_interval_mb: u64,
    /// Create checkpoints opportunistically after commits.
    pub checkpoint_auto: bool,
    /// Prune rotated segments after a checkpoint.
    pub trim_after_checkpoint: bool,
    /// Rotated segments retained past the checkpoint as a safety margin.
    pub segments_kept: usize,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("wal"),
            max_segment_mb: 64,
            fsync: FsyncPolicy::default(),
            checkpoint_interval_mb: 16,
            checkpoint_auto: true,
            trim_after_checkpoint: true,
            segments_kept: 2,
        }
    }
}

impl WalConfig {
    /// Rotation threshold in bytes.
    pub fn max_segment_bytes(&self) -> u64 {
        self.max_segment_mb * 1024 * 1024
    }

    /// Checkpoint interval in bytes.
    pub fn checkpoint_interval_bytes(&self) -> u64 {
        self.checkpoint_interval_mb * 1024 * 1024
    }
}

/// Scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Per-database queue depth; the backpressure threshold.
    pub queue_depth: usize,
    /// Worker count; 0 means auto-computed from CPU and database count.
    pub workers: usize,
    /// Ceiling for the auto-computed worker count.
    pub max_workers: usize,
    /// Grace period for the draining phase of shutdown, in milliseconds.
    pub drain_timeout_ms: u64,
    /// Grace period for in-flight operations during close, in milliseconds.
    pub close_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            queue_depth: 128,
            workers: 0,
            max_workers: 256,
            drain_timeout_ms: 5_000,
            close_timeout_ms: 5_000,
        }
    }
}

/// Memory caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Global cap across all databases, in megabytes.
    pub global_mb: u64,
    /// Per-database cap, in megabytes.
    pub per_db_mb: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            global_mb: 1024,
            per_db_mb: 256,
        }
    }
}

impl MemoryConfig {
    /// Global cap in bytes.
    pub fn global_bytes(&self) -> u64 {
        self.global_mb * 1024 * 1024
    }

    /// Per-database cap in bytes.
    pub fn per_db_bytes(&self) -> u64 {
        self.per_db_mb * 1024 * 1024
    }
}

/// Database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// Directory holding `<db>.data` files and the catalog.
    pub data_dir: PathBuf,
    /// Maximum simultaneously open logical databases.
    pub max_open: usize,
    /// Index shards per collection.
    pub index_shards: usize,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            max_open: 64,
            index_shards: 256,
        }
    }
}

/// Healing (corruption scan) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealingConfig {
    /// Run the background healing service.
    pub enabled: bool,
    /// Full-scan interval in milliseconds.
    pub scan_interval_ms: u64,
    /// Report corruption discovered by reads to the healing service.
    pub heal_on_read_corruption: bool,
    /// Maximum documents verified per scan cycle.
    pub max_batch: usize,
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scan_interval_ms: 30_000,
            heal_on_read_corruption: true,
            max_batch: 256,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Database settings.
    pub db: DbConfig,
    /// WAL settings.
    pub wal: WalConfig,
    /// Scheduler settings.
    pub scheduler: SchedulerConfig,
    /// Memory caps.
    pub memory: MemoryConfig,
    /// Healing settings.
    pub healing: HealingConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file. Missing keys take defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&text).map_err(|e| Error::Serialization(format!("bad config: {}", e)))
    }

    /// Load `quill.toml` from `dir` if present, otherwise defaults rooted
    /// at `dir` (data under `dir/data`, WAL under `dir/wal`).
    pub fn load_or_default<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let path = dir.join(CONFIG_FILE_NAME);
        let mut config = if path.exists() {
            Self::load(&path)?
        } else {
            Self::default()
        };
        if config.db.data_dir.is_relative() {
            config.db.data_dir = dir.join(&config.db.data_dir);
        }
        if config.wal.dir.is_relative() {
            config.wal.dir = dir.join(&config.wal.dir);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.scheduler.queue_depth, 128);
        assert_eq!(config.scheduler.workers, 0);
        assert_eq!(config.db.index_shards, 256);
        assert!(config.wal.checkpoint_auto);
        assert_eq!(
            config.wal.fsync,
            FsyncPolicy::Group {
                interval_ms: 1,
                batch_size: 100
            }
        );
    }

    #[test]
    fn test_toml_round_trip() {
        let config = EngineConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: EngineConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.wal.fsync, config.wal.fsync);
        assert_eq!(parsed.memory.global_mb, config.memory.global_mb);
    }

    #[test]
    fn test_partial_file_takes_defaults() {
        let parsed: EngineConfig = toml::from_str(
            r#"
            [scheduler]
            queue_depth = 7

            [wal.fsync]
            mode = "always"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.scheduler.queue_depth, 7);
        assert_eq!(parsed.scheduler.max_workers, 256);
        assert_eq!(parsed.wal.fsync, FsyncPolicy::Always);
    }

    #[test]
    fn test_fsync_none_is_explicit() {
        let parsed: EngineConfig = toml::from_str(
            r#"
            [wal.fsync]
            mode = "none"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.wal.fsync, FsyncPolicy::Disabled);
    }

    #[test]
    fn test_load_or_default_roots_paths() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load_or_default(dir.path()).unwrap();
        assert!(config.db.data_dir.starts_with(dir.path()));
        assert!(config.wal.dir.starts_with(dir.path()));
    }

    #[test]
    fn test_load_bad_toml_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "not [valid").unwrap();
        assert!(EngineConfig::load(&path).is_err());
    }
}
