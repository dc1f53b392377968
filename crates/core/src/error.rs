//! Error types for QuillDB
//!
//! One error enum for the whole engine, built with `thiserror`. Lower
//! layers (data file, WAL) classify their own failures before returning;
//! the logical-database layer maps error identity to a response status;
//! the pool/scheduler layer only distinguishes its own conditions
//! (`QueueFull`, `PoolStopped`, `DbNotActive`) from everything else.

use crate::types::{DbId, DocId, Status};
use std::io;
use thiserror::Error;

/// Result type alias used across all QuillDB crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the engine.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the data file or WAL.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Payload is not well-formed UTF-8 JSON, or is empty.
    #[error("invalid JSON payload: {0}")]
    InvalidJson(String),

    /// Patch op or path could not be applied.
    #[error("invalid patch: {0}")]
    InvalidPatch(String),

    /// Unknown operation type byte.
    #[error("unknown operation type: {0}")]
    UnknownOp(u8),

    /// Operation is not valid in this context.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Create on a doc id that already has a live version.
    #[error("document {doc_id} already exists in collection {collection:?}")]
    AlreadyExists {
        /// Target collection
        collection: String,
        /// Target document id
        doc_id: DocId,
    },

    /// Read/Update/Delete on a missing or tombstoned document.
    #[error("document {doc_id} not found in collection {collection:?}")]
    DocumentNotFound {
        /// Target collection
        collection: String,
        /// Target document id
        doc_id: DocId,
    },

    /// Collection does not exist.
    #[error("collection not found: {0:?}")]
    CollectionNotFound(String),

    /// Collection still holds live documents and cannot be deleted.
    #[error("collection not empty: {0:?}")]
    CollectionNotEmpty(String),

    /// Collection already exists.
    #[error("collection already exists: {0:?}")]
    CollectionExists(String),

    /// Database name already registered in the catalog.
    #[error("database already exists: {0:?}")]
    DatabaseExists(String),

    /// Database name or id not registered in the catalog.
    #[error("database not found: {0:?}")]
    DatabaseNotFound(String),

    /// Memory cap would be exceeded.
    #[error("memory limit exceeded: requested {requested} bytes, {available} available")]
    MemoryLimit {
        /// Bytes the operation tried to reserve
        requested: u64,
        /// Bytes still available under the cap
        available: u64,
    },

    /// CRC mismatch or unverified (torn) record. Never masked as not-found.
    #[error("data corruption: {0}")]
    Corruption(String),

    /// Snapshot/catalog encode or decode failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Operation on a closed logical database.
    #[error("database is closed")]
    DatabaseClosed,

    /// Scheduler has no active queue for this database.
    #[error("database not active: {0}")]
    DbNotActive(DbId),

    /// Per-database request queue is saturated (backpressure signal).
    #[error("request queue full for database {0}")]
    QueueFull(DbId),

    /// Pool is draining or stopped; no new work is accepted.
    #[error("pool is stopped")]
    PoolStopped,

    /// WAL-level failure that is not a plain I/O error.
    #[error("WAL error: {0}")]
    Wal(String),
}

/// Coarse classification used for retry eligibility and observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Bad input; never retried, storage never touched.
    Validation,
    /// Deterministic business-logic outcome (exists / not found / not empty).
    Conflict,
    /// Capacity exhausted; caller applies backpressure or cleanup.
    Resource,
    /// Temporary I/O condition; eligible for bounded retry.
    Transient,
    /// Permanent or critical failure; never retried.
    Permanent,
    /// Checksum/verification failure; never retried, never masked.
    Corruption,
    /// Pool/queue-level condition, not a storage error.
    Scheduling,
}

impl Error {
    /// Classify this error for retry and reporting purposes.
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Io(e) => match e.kind() {
                io::ErrorKind::WouldBlock
                | io::ErrorKind::Interrupted
                | io::ErrorKind::TimedOut => ErrorClass::Transient,
                _ => ErrorClass::Permanent,
            },
            Error::InvalidJson(_)
            | Error::InvalidPatch(_)
            | Error::UnknownOp(_)
            | Error::InvalidOperation(_) => ErrorClass::Validation,
            Error::AlreadyExists { .. }
            | Error::DocumentNotFound { .. }
            | Error::CollectionNotFound(_)
            | Error::CollectionNotEmpty(_)
            | Error::CollectionExists(_)
            | Error::DatabaseExists(_)
            | Error::DatabaseNotFound(_) => ErrorClass::Conflict,
            Error::MemoryLimit { .. } => ErrorClass::Resource,
            Error::Corruption(_) => ErrorClass::Corruption,
            Error::Serialization(_) | Error::DatabaseClosed | Error::Wal(_) => {
                ErrorClass::Permanent
            }
            Error::DbNotActive(_) | Error::QueueFull(_) | Error::PoolStopped => {
                ErrorClass::Scheduling
            }
        }
    }

    /// Whether a bounded retry with backoff is worthwhile.
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// Response status for this error.
    pub fn status(&self) -> Status {
        match self {
            Error::DocumentNotFound { .. }
            | Error::CollectionNotFound(_)
            | Error::DatabaseNotFound(_) => Status::NotFound,
            Error::AlreadyExists { .. }
            | Error::CollectionNotEmpty(_)
            | Error::CollectionExists(_)
            | Error::DatabaseExists(_) => Status::Conflict,
            Error::MemoryLimit { .. } => Status::MemoryLimit,
            _ => Status::Error,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::InvalidJson(e.to_string())
    }
}
