//! QuillDB engine
//!
//! Ties the lower layers into a usable system:
//!
//! - `LogicalDatabase`: one database (data file, WAL, index, registry,
//!   sequencer) with the durable-before-visible commit pipeline and
//!   crash recovery on open.
//! - `Pool`: the multi-database front door. Owns the catalog, the global
//!   memory quota, and the scheduler; opens databases lazily and routes
//!   requests to them.
//! - `Scheduler`: per-database bounded queues drained round-robin by a
//!   worker pool; saturation surfaces as a `QueueFull` error instead of
//!   unbounded buffering.
//! - `Catalog`: the persistent database-name-to-id map.
//! - `HealingService`: background corruption scanning over the data file.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod database;
pub mod healing;
pub mod pool;
pub mod scheduler;

pub use catalog::Catalog;
pub use database::{DatabaseStats, LogicalDatabase};
pub use healing::{CorruptionReport, HealingService};
pub use pool::Pool;
pub use scheduler::{QueuedRequest, Scheduler};

pub use quill_concurrency::Transaction;
