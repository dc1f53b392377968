//! Document CRUD behavior against a single logical database.

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
fn test_create_read_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(dir.path());
    db.create("users", 1, br#"{"name":"ada"}"#).unwrap();
    assert_eq!(db.read("users", 1).unwrap(), br#"{"name":"ada"}"#);
}

#[test]
fn test_create_duplicate_conflicts() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(dir.path());
    db.create("users", 1, br#"{"v":1}"#).unwrap();
    assert!(matches!(
        db.create("users", 1, br#"{"v":2}"#),
        Err(Error::AlreadyExists { doc_id: 1, .. })
    ));
    // Original payload untouched
    assert_eq!(db.read("users", 1).unwrap(), br#"{"v":1}"#);
}

#[test]
fn test_update_replaces_payload() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(dir.path());
    db.create("users", 1, br#"{"v":1}"#).unwrap();
    db.update("users", 1, br#"{"v":2}"#).unwrap();
    assert_eq!(db.read("users", 1).unwrap(), br#"{"v":2}"#);
}

#[test]
fn test_update_missing_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(dir.path());
    assert!(matches!(
        db.update("", 7, br#"{}"#),
        Err(Error::DocumentNotFound { doc_id: 7, .. })
    ));
}

#[test]
fn test_delete_then_recreate() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(dir.path());
    db.create("users", 1, br#"{"v":1}"#).unwrap();
    db.delete("users", 1).unwrap();

    assert!(matches!(
        db.read("users", 1),
        Err(Error::DocumentNotFound { .. })
    ));
    assert!(matches!(
        db.delete("users", 1),
        Err(Error::DocumentNotFound { .. })
    ));

    // A tombstoned id can be created again
    db.create("users", 1, br#"{"v":2}"#).unwrap();
    assert_eq!(db.read("users", 1).unwrap(), br#"{"v":2}"#);
}

#[test]
fn test_patch_mutates_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(dir.path());
    db.create("users", 1, br#"{"name":"ada","tags":["a"]}"#)
        .unwrap();

    let patched = db
        .patch(
            "users",
            1,
            br#"[{"op":"set","path":"/name","value":"grace"},{"op":"insert","path":"/tags/1","value":"b"}]"#,
        )
        .unwrap();
    let doc: serde_json::Value = serde_json::from_slice(&patched).unwrap();
    assert_eq!(doc["name"], "grace");
    assert_eq!(doc["tags"], serde_json::json!(["a", "b"]));
    assert_eq!(db.read("users", 1).unwrap(), patched);
}

#[test]
fn test_patch_invalid_ops_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(dir.path());
    db.create("users", 1, br#"{"a":1}"#).unwrap();
    assert!(matches!(
        db.patch("users", 1, b"not json"),
        Err(Error::InvalidPatch(_))
    ));
    assert!(matches!(
        db.patch("users", 1, br#"[{"op":"explode","path":"/a"}]"#),
        Err(Error::InvalidPatch(_))
    ));
    // Document untouched by failed patches
    assert_eq!(db.read("users", 1).unwrap(), br#"{"a":1}"#);
}

#[test]
fn test_invalid_json_rejected_before_storage() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(dir.path());
    assert!(matches!(
        db.create("users", 1, b"{broken"),
        Err(Error::InvalidJson(_))
    ));
    assert!(matches!(
        db.create("users", 2, b""),
        Err(Error::InvalidJson(_))
    ));
    let stats = db.stats();
    assert_eq!(stats.docs_live, 0);
    assert_eq!(stats.total_txns, 0);
    assert_eq!(stats.memory_used, 0);
}

#[test]
fn test_empty_collection_routes_to_default() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(dir.path());
    db.create("", 1, br#"{"v":1}"#).unwrap();
    assert_eq!(db.read("default", 1).unwrap(), br#"{"v":1}"#);
    assert_eq!(db.read("", 1).unwrap(), br#"{"v":1}"#);
}

#[test]
fn test_collection_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(dir.path());
    db.create_collection("events").unwrap();
    assert!(matches!(
        db.create_collection("events"),
        Err(Error::CollectionExists(_))
    ));

    let names: Vec<String> = db.collections().into_iter().map(|m| m.name).collect();
    assert!(names.contains(&"events".to_string()));
    assert!(names.contains(&"default".to_string()));

    db.create("events", 1, br#"{"v":1}"#).unwrap();
    assert!(matches!(
        db.delete_collection("events"),
        Err(Error::CollectionNotEmpty(_))
    ));
    db.delete("events", 1).unwrap();
    db.delete_collection("events").unwrap();
    assert!(matches!(
        db.delete_collection("events"),
        Err(Error::CollectionNotFound(_))
    ));
}

#[test]
fn test_default_collection_cannot_be_deleted() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(dir.path());
    assert!(matches!(
        db.delete_collection("default"),
        Err(Error::InvalidOperation(_))
    ));
}

#[test]
fn test_read_missing_collection() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(dir.path());
    assert!(matches!(
        db.read("ghost", 1),
        Err(Error::CollectionNotFound(_))
    ));
}

#[test]
fn test_memory_limit_enforced() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.memory.per_db_mb = 0;
    let global = Arc::new(MemoryQuota::new(config.memory.global_bytes()));
    let db = LogicalDatabase::open(1, "testdb", &config, global).unwrap();

    let err = db.create("users", 1, br#"{"v":1}"#).unwrap_err();
    assert!(matches!(err, Error::MemoryLimit { .. }));
    assert_eq!(db.stats().docs_live, 0);
}

#[test]
fn test_quota_accounting_follows_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(dir.path());
    let payload = br#"{"v":1}"#;
    db.create("users", 1, payload).unwrap();
    assert_eq!(db.stats().memory_used, payload.len() as u64);

    let bigger = br#"{"v":1,"extra":"xxxx"}"#;
    db.update("users", 1, bigger).unwrap();
    assert_eq!(db.stats().memory_used, bigger.len() as u64);

    db.delete("users", 1).unwrap();
    assert_eq!(db.stats().memory_used, 0);
}

#[test]
fn test_stats_counts() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(dir.path());
    for doc in 1..=5u64 {
        db.create("users", doc, br#"{"v":1}"#).unwrap();
    }
    db.delete("users", 3).unwrap();

    let stats = db.stats();
    assert_eq!(stats.docs_live, 4);
    assert_eq!(stats.docs_tombstoned, 1);
    assert_eq!(stats.total_txns, 6);
    assert!(stats.wal_size > 0);
}

#[test]
fn test_close_releases_global_quota_despite_flush_failure() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let global = Arc::new(MemoryQuota::new(config.memory.global_bytes()));
    let db = LogicalDatabase::open(1, "testdb", &config, Arc::clone(&global)).unwrap();
    db.create("users", 1, br#"{"v":1}"#).unwrap();
    assert!(global.used() > 0);

    // Occupy the snapshot path with a directory so the final
    // checkpoint's rename fails during close
    std::fs::create_dir(config.wal.dir.join("testdb.snap")).unwrap();
    db.close().unwrap();
    assert_eq!(global.used(), 0);
}

#[test]
fn test_closed_database_rejects_operations() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(dir.path());
    db.create("users", 1, br#"{"v":1}"#).unwrap();
    db.close().unwrap();
    assert!(matches!(
        db.create("users", 2, br#"{}"#),
        Err(Error::DatabaseClosed)
    ));
    assert!(matches!(db.read("users", 1), Err(Error::DatabaseClosed)));
    // Close is idempotent
    db.close().unwrap();
}
