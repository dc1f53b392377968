//! Explicit transactions: atomicity, visibility granularity, recovery.

use quill_core::{EngineConfig, Error, FsyncPolicy};
use quill_engine::LogicalDatabase;
use quill_storage::MemoryQuota;
use std::path::Path;
use std::sync::Arc;

fn test_config(dir: &Path) -> EngineConfig {
    let mut config = EngineConfig::load_or_default(dir).unwrap();
    config.wal.fsync = FsyncPolicy::Always;
    config.healing.enabled = false;
    config
}

fn open_db(dir: &Path) -> Arc<LogicalDatabase> {
    let config = test_config(dir);
    let global = Arc::new(MemoryQuota::new(config.memory.global_bytes()));
    LogicalDatabase::open(1, "testdb", &config, global).unwrap()
}

#[test]
fn test_batch_commits_atomically() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(dir.path());

    let mut tx = db.begin().unwrap();
    tx.create("users", 1, br#"{"v":1}"#.to_vec());
    tx.create("users", 2, br#"{"v":2}"#.to_vec());
    tx.update("users", 1, br#"{"v":10}"#.to_vec());
    db.commit(tx).unwrap();

    assert_eq!(db.read("users", 1).unwrap(), br#"{"v":10}"#);
    assert_eq!(db.read("users", 2).unwrap(), br#"{"v":2}"#);
    assert_eq!(db.stats().docs_live, 2);
}

#[test]
fn test_singletons_and_batch_differ_in_granularity() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(dir.path());

    // Three singleton writes: three visibility points
    for doc in 1..=3u64 {
        db.create("solo", doc, br#"{"v":1}"#).unwrap();
    }
    assert_eq!(db.stats().total_txns, 3);

    // The same three writes in one transaction: one visibility point
    let mut tx = db.begin().unwrap();
    for doc in 11..=13u64 {
        tx.create("batch", doc, br#"{"v":1}"#.to_vec());
    }
    db.commit(tx).unwrap();
    assert_eq!(db.stats().total_txns, 4);
}

#[test]
fn test_rollback_leaves_no_trace() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(dir.path());
    db.create("users", 1, br#"{"v":1}"#).unwrap();

    let mut tx = db.begin().unwrap();
    tx.create("users", 2, br#"{"v":2}"#.to_vec());
    tx.delete("users", 1);
    db.rollback(tx);

    assert_eq!(db.read("users", 1).unwrap(), br#"{"v":1}"#);
    assert!(matches!(
        db.read("users", 2),
        Err(Error::DocumentNotFound { .. })
    ));
    assert_eq!(db.stats().docs_live, 1);
}

#[test]
fn test_failed_batch_applies_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(dir.path());

    let mut tx = db.begin().unwrap();
    tx.create("users", 1, br#"{"v":1}"#.to_vec());
    tx.update("users", 99, br#"{"v":9}"#.to_vec()); // no such document
    let err = db.commit(tx).unwrap_err();
    assert!(matches!(err, Error::DocumentNotFound { doc_id: 99, .. }));

    // The valid create in the same batch must not have applied
    assert!(matches!(
        db.read("users", 1),
        Err(Error::DocumentNotFound { .. }) | Err(Error::CollectionNotFound(_))
    ));
    assert_eq!(db.stats().docs_live, 0);
    assert_eq!(db.stats().memory_used, 0);
}

#[test]
fn test_batch_validates_against_its_own_effects() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(dir.path());

    // Create then update the same doc inside one batch
    let mut tx = db.begin().unwrap();
    tx.create("users", 1, br#"{"v":1}"#.to_vec());
    tx.update("users", 1, br#"{"v":2}"#.to_vec());
    db.commit(tx).unwrap();
    assert_eq!(db.read("users", 1).unwrap(), br#"{"v":2}"#);

    // Create then delete: the doc never becomes visible
    let mut tx = db.begin().unwrap();
    tx.create("users", 2, br#"{"v":1}"#.to_vec());
    tx.delete("users", 2);
    db.commit(tx).unwrap();
    assert!(matches!(
        db.read("users", 2),
        Err(Error::DocumentNotFound { .. })
    ));

    // Duplicate create within a batch conflicts
    let mut tx = db.begin().unwrap();
    tx.create("users", 3, br#"{"v":1}"#.to_vec());
    tx.create("users", 3, br#"{"v":2}"#.to_vec());
    assert!(matches!(
        db.commit(tx),
        Err(Error::AlreadyExists { doc_id: 3, .. })
    ));
}

#[test]
fn test_empty_transaction_commits() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(dir.path());
    let tx = db.begin().unwrap();
    db.commit(tx).unwrap();
    assert_eq!(db.stats().total_txns, 1);
}

#[test]
fn test_invalid_payload_rejected_before_durability() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(dir.path());
    let mut tx = db.begin().unwrap();
    tx.create("users", 1, b"not-json".to_vec());
    assert!(matches!(db.commit(tx), Err(Error::InvalidJson(_))));
    assert_eq!(db.stats().docs_live, 0);
}

#[test]
fn test_committed_batch_survives_recovery_as_unit() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = open_db(dir.path());
        let mut tx = db.begin().unwrap();
        tx.create("users", 1, br#"{"v":1}"#.to_vec());
        tx.create("users", 2, br#"{"v":2}"#.to_vec());
        db.commit(tx).unwrap();
        // Dropped without close
    }
    let db = open_db(dir.path());
    assert_eq!(db.replayed_records(), 2);
    assert_eq!(db.read("users", 1).unwrap(), br#"{"v":1}"#);
    assert_eq!(db.read("users", 2).unwrap(), br#"{"v":2}"#);
}

#[test]
fn test_quota_reconciles_after_batch() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(dir.path());
    db.create("users", 1, br#"{"v":1}"#).unwrap();

    let replacement = br#"{"v":2,"longer":"payload"}"#;
    let mut tx = db.begin().unwrap();
    tx.update("users", 1, replacement.to_vec());
    tx.create("users", 2, br#"{"v":3}"#.to_vec());
    tx.delete("users", 2);
    db.commit(tx).unwrap();

    // Only the replacement payload remains charged
    assert_eq!(db.stats().memory_used, replacement.len() as u64);
}
