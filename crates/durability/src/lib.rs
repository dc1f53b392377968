//! Durability layer for QuillDB
//!
//! - `WalRecord`: the binary WAL record codec.
//! - `WalWriter`: append-only log writer with configurable fsync policy
//!   (group commit by default), segment rotation, and an error tracker.
//! - `CheckpointManager`: periodic recovery points (index snapshot file,
//!   checkpoint record, segment trimming).
//! - `WalReader` / `replay`: crash recovery, bounded by the last
//!   checkpoint and filtered by commit markers.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod record;
pub mod replay;
pub mod tracker;
pub mod writer;

pub use checkpoint::{CheckpointManager, CollectionSnapshot, IndexSnapshot};
pub use record::WalRecord;
pub use replay::{replay, ReplayOutcome, WalReader};
pub use tracker::{ErrorCounts, ErrorTracker};
pub use writer::WalWriter;
