//! QuillDB: an embeddable single-node JSON document storage engine.
//!
//! Documents live in named collections inside logical databases. Every
//! mutation is written ahead to a per-database log and only becomes
//! visible after its commit marker is durable, so a crash never exposes
//! half a transaction. Reads go through an in-memory MVCC index against
//! checksummed payloads in an append-only data file.
//!
//! The [`Pool`] is the usual entry point: it manages the catalog of
//! databases, a global memory quota, and a scheduler that drains
//! per-database bounded queues with a shared worker pool.
//!
//! ```no_run
//! use quilldb::{OpType, Pool, Request};
//!
//! # fn main() -> quilldb::Result<()> {
//! let pool = Pool::start("/var/lib/quilldb")?;
//! let id = pool.create_database("app")?;
//!
//! let rx = pool.execute(Request {
//!     db_id: id,
//!     collection: "users".into(),
//!     doc_id: 1,
//!     op: OpType::Create,
//!     payload: br#"{"name":"ada"}"#.to_vec(),
//! })?;
//! let response = rx.recv().expect("pool dropped");
//! # let _ = response;
//! # Ok(())
//! # }
//! ```
//!
//! For the embedded API — explicit transactions, checkpoints, stats —
//! fetch a [`LogicalDatabase`] handle with [`Pool::database`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub use quill_core::{
    DbId, DocId, EngineConfig, Error, ErrorClass, FsyncPolicy, OpType, PatchOp, Request, Response,
    Result, Status, TxId,
};
pub use quill_engine::{
    Catalog, DatabaseStats, LogicalDatabase, Pool, Scheduler, Transaction,
};
