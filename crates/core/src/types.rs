//! Core identifier and document types
//!
//! Ids are plain `u64` aliases: they cross the WAL format, the index, and
//! the wire layer, and a newtype would buy nothing at those boundaries.
//!
//! `DocumentVersion` is the unit the MVCC index stores: one committed state
//! of a document, immutable except for the tombstone field.

use crate::error::Error;
use serde::{Deserialize, Serialize};

/// Transaction id. Monotonically increasing per logical database.
pub type TxId = u64;

/// Logical database id, allocated by the catalog.
pub type DbId = u64;

/// Document id, chosen by the client.
pub type DocId = u64;

/// Collection used when a request carries an empty collection name.
pub const DEFAULT_COLLECTION: &str = "default";

/// Normalize an empty collection name to the default collection.
pub fn normalize_collection(name: &str) -> &str {
    if name.is_empty() {
        DEFAULT_COLLECTION
    } else {
        name
    }
}

/// Operation kinds, as stored in WAL records and carried by requests.
///
/// This is a closed set: request dispatch and replay both match on it
/// exhaustively so a new operation cannot be added without visiting
/// every consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum OpType {
    /// Create a new document.
    Create = 1,
    /// Read a document (never appears in the WAL).
    Read = 2,
    /// Replace a document's payload.
    Update = 3,
    /// Tombstone a document.
    Delete = 4,
    /// Patch a document (WAL record carries the full patched payload).
    Patch = 5,
    /// Commit marker: marks a transaction's records durable and applicable.
    Commit = 6,
    /// Checkpoint marker: recovery cut point, tx_id = highest committed id.
    Checkpoint = 7,
    /// Create a collection (collection field carries the target name).
    CreateCollection = 8,
    /// Delete a collection.
    DeleteCollection = 9,
}

impl OpType {
    /// Wire encoding of the operation kind.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decode an operation kind, rejecting unknown values.
    pub fn from_u8(v: u8) -> Result<Self, Error> {
        match v {
            1 => Ok(OpType::Create),
            2 => Ok(OpType::Read),
            3 => Ok(OpType::Update),
            4 => Ok(OpType::Delete),
            5 => Ok(OpType::Patch),
            6 => Ok(OpType::Commit),
            7 => Ok(OpType::Checkpoint),
            8 => Ok(OpType::CreateCollection),
            9 => Ok(OpType::DeleteCollection),
            other => Err(Error::UnknownOp(other)),
        }
    }

    /// Whether records of this kind mutate document state on replay.
    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            OpType::Create
                | OpType::Update
                | OpType::Delete
                | OpType::Patch
                | OpType::CreateCollection
                | OpType::DeleteCollection
        )
    }
}

/// One committed state of a document.
///
/// Immutable once created, with one exception: a delete sets `deleted_tx`
/// in place (tombstone). A logical update produces a new `DocumentVersion`
/// pointing at a new data-file offset; the old object is superseded by
/// index overwrite, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentVersion {
    /// Document id.
    pub doc_id: DocId,
    /// Transaction that created this version.
    pub created_tx: TxId,
    /// Transaction that tombstoned this version, if any.
    pub deleted_tx: Option<TxId>,
    /// Byte offset of the payload record in the data file.
    pub offset: u64,
    /// Payload length in bytes.
    pub length: u32,
}

impl DocumentVersion {
    /// New live version.
    pub fn new(doc_id: DocId, created_tx: TxId, offset: u64, length: u32) -> Self {
        Self {
            doc_id,
            created_tx,
            deleted_tx: None,
            offset,
            length,
        }
    }

    /// Snapshot visibility: created at or before the snapshot, and not
    /// deleted at or before it.
    pub fn is_visible(&self, snapshot: TxId) -> bool {
        self.created_tx <= snapshot && self.deleted_tx.map_or(true, |d| d > snapshot)
    }

    /// Whether this version has not been tombstoned.
    pub fn is_live(&self) -> bool {
        self.deleted_tx.is_none()
    }
}

/// A client request as handed to the pool.
///
/// For `Patch`, `payload` carries the JSON-encoded array of patch ops.
/// For collection operations, `collection` names the target and `doc_id`
/// is ignored.
#[derive(Debug, Clone)]
pub struct Request {
    /// Target logical database.
    pub db_id: DbId,
    /// Target collection ("" means the default collection).
    pub collection: String,
    /// Target document.
    pub doc_id: DocId,
    /// Operation to perform.
    pub op: OpType,
    /// Operation payload (document bytes, or patch ops for `Patch`).
    pub payload: Vec<u8>,
}

/// Typed outcome of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Operation succeeded.
    Ok,
    /// Operation failed (I/O, corruption, validation, scheduling).
    Error,
    /// Document, collection, or database not found.
    NotFound,
    /// Deterministic business-logic conflict (already exists, not empty).
    Conflict,
    /// Memory cap exceeded; caller should back off or clean up.
    MemoryLimit,
}

/// Response delivered on the caller's response channel.
#[derive(Debug, Clone)]
pub struct Response {
    /// Typed status.
    pub status: Status,
    /// Result bytes (document payload for reads, JSON for listings).
    pub data: Vec<u8>,
    /// Error message when `status != Ok`.
    pub error: Option<String>,
}

impl Response {
    /// Successful response with payload bytes.
    pub fn ok(data: Vec<u8>) -> Self {
        Self {
            status: Status::Ok,
            data,
            error: None,
        }
    }

    /// Successful response with no payload.
    pub fn ok_empty() -> Self {
        Self::ok(Vec::new())
    }

    /// Failed response; the status is derived from the error's identity.
    pub fn from_error(err: &Error) -> Self {
        Self {
            status: err.status(),
            data: Vec::new(),
            error: Some(err.to_string()),
        }
    }
}
