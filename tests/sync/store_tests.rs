// Object store tests against the in-memory backend

use std::fs;
use std::time::Instant;

use logsync::store::{ObjectStore, RemoteExistenceChecker, RemoteState, Uploader};
use logsync::sync::{Console, ProgressSink};

#[tokio::test]
async fn test_upload_then_probe() {
    let store = ObjectStore::memory("logs").unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("access.log");
    fs::write(&path, b"GET /index.html 200\n").unwrap();

    assert_eq!(store.exists("logs", "atm/access.log").await, RemoteState::Absent);
    assert!(store.upload(&path, "logs", "atm/access.log", None).await);
    assert_eq!(store.exists("logs", "atm/access.log").await, RemoteState::Present);
    assert_eq!(
        store.read("logs", "atm/access.log").await.unwrap(),
        b"GET /index.html 200\n"
    );
}

#[tokio::test]
async fn test_unconfigured_bucket() {
    let store = ObjectStore::memory("logs").unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.log");
    fs::write(&path, b"a").unwrap();

    assert_eq!(store.exists("other", "a.log").await, RemoteState::Unknown);
    assert!(!store.upload(&path, "other", "a.log", None).await);
}

#[tokio::test]
async fn test_missing_local_file_fails_upload() {
    let store = ObjectStore::memory("logs").unwrap();
    let dir = tempfile::tempdir().unwrap();

    assert!(!store.upload(&dir.path().join("gone.log"), "logs", "gone.log", None).await);
    assert_eq!(store.exists("logs", "gone.log").await, RemoteState::Absent);
}

#[tokio::test]
async fn test_chunked_upload_reports_progress() {
    let store = ObjectStore::memory("logs").unwrap().with_chunk_size(16);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("big.log");
    let data: Vec<u8> = (0..100u8).collect();
    fs::write(&path, &data).unwrap();

    let (console, captured) = Console::capture();
    let sink = ProgressSink::new("/src/atm", Instant::now(), console);

    assert!(store.upload(&path, "logs", "atm/big.log", Some(sink)).await);
    assert_eq!(store.read("logs", "atm/big.log").await.unwrap(), data);

    let lines = captured.lines();
    assert_eq!(lines.len(), 7);
    assert!(lines.iter().all(|l| l.starts_with("/src/atm - ")));
    assert!(lines.last().unwrap().contains("100.0B / 100.0B - 100%"), "{:?}", lines);
}
