//! Storage layer for QuillDB
//!
//! - `DataFile`: append-only, checksummed, verified payload store. Byte
//!   offsets returned by appends become the row pointers held by the
//!   MVCC index.
//! - `MemoryQuota`: the capacity counter backing global and per-database
//!   memory caps.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod data_file;
pub mod quota;

pub use data_file::DataFile;
pub use quota::MemoryQuota;
