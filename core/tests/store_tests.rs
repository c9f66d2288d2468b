use kbsearch_core::persist::{append_record, append_records, load_meta, load_records, replay, save_records, SnapshotPaths};
use kbsearch_core::{KnowledgeRecord, StoreError, VectorEngine};
use serde_json::json;
use std::fs;
use tempfile::tempdir;

fn record(id: &str, text: &str) -> KnowledgeRecord {
    KnowledgeRecord { id: id.into(), text: text.into(), metadata: json!({"source": "admin"}) }
}

#[test]
fn appended_records_replay_into_fresh_engine() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("kb/records.jsonl");
    append_record(&log, &record("hours", "Weekday opening hours are eight to five.")).unwrap();
    append_record(&log, &record("fees", "General consultation fees are R450.")).unwrap();
    append_record(&log, &record("parking", "Visitor parking is behind the pharmacy.")).unwrap();

    let records = load_records(&log).unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[1].id, "fees");

    let mut engine = VectorEngine::new();
    assert_eq!(replay(&mut engine, records), 3);
    let hits = engine.search("consultation fees");
    assert_eq!(hits[0].document.id, "fees");
    assert_eq!(hits[0].document.metadata["source"], "admin");
}

#[test]
fn loads_json_arrays_and_directories() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("a.json"),
        r#"[{"id":"a1","text":"first"},{"id":"a2","text":"second","metadata":{"k":1}}]"#,
    )
    .unwrap();
    fs::create_dir_all(dir.path().join("nested")).unwrap();
    fs::write(dir.path().join("nested/b.jsonl"), "{\"id\":\"b1\",\"text\":\"third\"}\n\n").unwrap();
    fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let records = load_records(dir.path()).unwrap();
    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["a1", "a2", "b1"]);
    assert!(records[0].metadata.is_null());
    assert_eq!(records[1].metadata["k"], 1);
}

#[test]
fn malformed_line_reports_position() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("records.jsonl");
    fs::write(&log, "{\"id\":\"ok\",\"text\":\"fine\"}\nnot json\n").unwrap();
    match load_records(&log) {
        Err(StoreError::Decode { line, .. }) => assert_eq!(line, 2),
        other => panic!("expected decode error, got {other:?}"),
    }
}

#[test]
fn missing_file_is_a_read_error() {
    let dir = tempdir().unwrap();
    let err = load_records(dir.path().join("absent.jsonl")).unwrap_err();
    assert!(matches!(err, StoreError::Read { .. }));
}

#[test]
fn snapshot_writes_records_and_meta() {
    let dir = tempdir().unwrap();
    let paths = SnapshotPaths::new(dir.path().join("snap"));
    let records = vec![record("r1", "alpha entry"), record("r2", "beta entry")];
    let meta = save_records(&paths, &records).unwrap();
    assert_eq!(meta.num_records, 2);

    let loaded_meta = load_meta(&paths).unwrap();
    assert_eq!(loaded_meta.num_records, 2);
    assert_eq!(loaded_meta.version, 1);
    assert!(!loaded_meta.created_at.is_empty());
    assert_eq!(load_records(paths.records()).unwrap(), records);
}

#[test]
fn scalar_json_file_is_a_decode_error() {
    let dir = tempdir().unwrap();
    let kb = dir.path().join("kb.json");
    fs::write(&kb, r#""not a record""#).unwrap();
    assert!(matches!(load_records(&kb), Err(StoreError::Decode { .. })));

    fs::write(&kb, "null").unwrap();
    assert!(matches!(load_records(&kb), Err(StoreError::Decode { .. })));
}

#[test]
fn batch_append_is_one_write() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("records.jsonl");
    append_records(&log, &[record("b1", "first"), record("b2", "second")]).unwrap();
    append_records(&log, &[]).unwrap();
    let ids: Vec<String> = load_records(&log).unwrap().into_iter().map(|r| r.id).collect();
    assert_eq!(ids, vec!["b1", "b2"]);
}

#[test]
fn append_under_a_file_reports_the_log_path() {
    let dir = tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, "regular file").unwrap();
    let log = blocker.join("records.jsonl");
    match append_records(&log, &[record("x", "never written")]) {
        Err(StoreError::Write { path, .. }) => assert_eq!(path, log),
        other => panic!("expected write error, got {other:?}"),
    }
}

#[test]
fn snapshot_write_failure_keeps_the_records_path() {
    let dir = tempdir().unwrap();
    let paths = SnapshotPaths::new(dir.path());
    // a directory where the records file should go
    fs::create_dir_all(paths.records()).unwrap();
    match save_records(&paths, &[record("r1", "alpha entry")]) {
        Err(StoreError::Write { path, .. }) => assert_eq!(path, paths.records()),
        other => panic!("expected write error, got {other:?}"),
    }
}
