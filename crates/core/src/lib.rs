//! Shared types for QuillDB
//!
//! This crate defines the vocabulary used by every other layer:
//! - Ids, operation kinds, document versions, requests and responses
//! - The error taxonomy with retry classification
//! - The retry policy used by the I/O layers
//! - JSON patch application (set/delete/insert over slash paths)
//! - The configuration surface (`quill.toml`)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod patch;
pub mod retry;
pub mod types;

pub use config::{
    DbConfig, EngineConfig, FsyncPolicy, HealingConfig, MemoryConfig, SchedulerConfig, WalConfig,
};
pub use error::{Error, ErrorClass, Result};
pub use patch::{apply_patch, PatchOp};
pub use retry::RetryPolicy;
pub use types::{
    normalize_collection, DbId, DocId, DocumentVersion, OpType, Request, Response, Status, TxId,
    DEFAULT_COLLECTION,
};
