//! End-to-end smoke tests through the public facade.

use quilldb::{EngineConfig, FsyncPolicy, OpType, Pool, Request, Status};
use std::time::Duration;

#[test]
fn test_full_document_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = EngineConfig::load_or_default(dir.path()).unwrap();
    config.wal.fsync = FsyncPolicy::Always;
    config.healing.enabled = false;
    let pool = Pool::start_with(config).unwrap();
    let id = pool.create_database("app").unwrap();

    let run = |op: OpType, doc_id: u64, payload: &[u8]| {
        pool.execute(Request {
            db_id: id,
            collection: "notes".into(),
            doc_id,
            op,
            payload: payload.to_vec(),
        })
        .unwrap()
        .recv_timeout(Duration::from_secs(5))
        .unwrap()
    };

    assert_eq!(run(OpType::Create, 1, br#"{"title":"first"}"#).status, Status::Ok);

    let resp = run(
        OpType::Patch,
        1,
        br#"[{"op":"set","path":"/title","value":"second"}]"#,
    );
    assert_eq!(resp.status, Status::Ok);
    let doc: serde_json::Value = serde_json::from_slice(&resp.data).unwrap();
    assert_eq!(doc["title"], "second");

    let resp = run(OpType::Read, 1, b"");
    assert_eq!(resp.status, Status::Ok);
    assert_eq!(resp.data, serde_json::to_vec(&doc).unwrap());

    assert_eq!(run(OpType::Delete, 1, b"").status, Status::Ok);
    assert_eq!(run(OpType::Read, 1, b"").status, Status::NotFound);

    pool.stop();
}

#[test]
fn test_restart_preserves_data() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = EngineConfig::load_or_default(dir.path()).unwrap();
    config.wal.fsync = FsyncPolicy::Always;
    config.healing.enabled = false;

    let id;
    {
        let pool = Pool::start_with(config.clone()).unwrap();
        id = pool.create_database("app").unwrap();
        let db = pool.database(id).unwrap();
        db.create("notes", 1, br#"{"title":"kept"}"#).unwrap();
        pool.stop();
    }

    let pool = Pool::start_with(config).unwrap();
    assert_eq!(pool.open_database("app").unwrap(), id);
    let db = pool.database(id).unwrap();
    assert_eq!(db.read("notes", 1).unwrap(), br#"{"title":"kept"}"#);
    pool.stop();
}
