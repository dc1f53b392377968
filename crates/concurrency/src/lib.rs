//! Concurrency layer for QuillDB
//!
//! - `TxnSequencer`: monotonic transaction ids and the snapshot counter
//!   used for visibility checks.
//! - `ShardedIndex`: the in-memory MVCC-lite index, partitioned into
//!   independently locked shards per collection.
//! - `CollectionRegistry`: collection existence and live document counts.
//! - `Transaction` / `TransactionManager`: the explicit multi-operation
//!   transaction buffer.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod index;
pub mod registry;
pub mod sequencer;
pub mod transaction;

pub use index::{CollectionIndex, ShardedIndex, DEFAULT_SHARD_COUNT};
pub use registry::{CollectionMeta, CollectionRegistry};
pub use sequencer::TxnSequencer;
pub use transaction::{PendingOp, Transaction, TransactionManager};
