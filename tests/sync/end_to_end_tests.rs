// End-to-end tests for the sync orchestrator over an in-memory bucket

use flate2::read::GzDecoder;
use std::fs;
use std::io::Read;

use logsync::store::RemoteState;
use logsync::sync::{
    Console, GzipTransform, Job, SkipReason, SyncOptions, SyncOrchestrator, TransferOutcome,
    UnknownRemotePolicy,
};

use super::common::{gzip_bytes, RecordingStore};

fn options(compress: bool) -> SyncOptions {
    let mut options = SyncOptions::new("logs");
    options.compress = compress;
    options.workers = 4;
    options
}

#[tokio::test]
async fn test_compress_then_upload_atm_job() {
    let root = tempfile::tempdir().unwrap();
    let src = root.path().join("atm");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("access.log"), vec![b'a'; 100]).unwrap();
    fs::write(src.join("error.log"), vec![b'e'; 50]).unwrap();
    let old = gzip_bytes(b"yesterday");
    fs::write(src.join("old.log.gz"), &old).unwrap();

    let store = RecordingStore::forced("logs", RemoteState::Absent);
    let (console, captured) = Console::capture();
    let sync = SyncOrchestrator::new(store.clone(), store.clone(), GzipTransform::default(), options(true))
        .with_console(console);

    let report = sync.run(&[Job::with_includes(&src, "atm", &["*.log"])]).await;

    assert!(report.is_success());
    assert!(!src.join("access.log").exists());
    assert!(!src.join("error.log").exists());
    assert!(src.join("access.log.gz").exists());
    assert!(src.join("error.log.gz").exists());
    assert_eq!(fs::read(src.join("old.log.gz")).unwrap(), old);

    assert_eq!(
        store.uploaded_keys(),
        vec!["atm/access.log.gz".to_string(), "atm/error.log.gz".to_string()]
    );

    let uploaded = store.inner.read("logs", "atm/access.log.gz").await.unwrap();
    let mut decoded = Vec::new();
    GzDecoder::new(uploaded.as_slice()).read_to_end(&mut decoded).unwrap();
    assert_eq!(decoded, vec![b'a'; 100]);

    let lines = captured.lines();
    let summary = lines.last().unwrap();
    assert!(summary.contains("sync to atm: 2 uploaded, 0 skipped, 0 failed"), "{summary}");
}

#[tokio::test]
async fn test_second_run_skips_everything() {
    let root = tempfile::tempdir().unwrap();
    let src = root.path().join("en");
    fs::create_dir_all(src.join("2024/01")).unwrap();
    fs::write(src.join("2024/01/access.log"), b"first").unwrap();
    fs::write(src.join("notes.txt"), b"ignored").unwrap();

    let store = RecordingStore::new("logs");
    let (console, _) = Console::capture();
    let sync = SyncOrchestrator::new(store.clone(), store.clone(), GzipTransform::default(), options(true))
        .with_console(console);
    let jobs = [Job::with_includes(&src, "logs/en", &["*.log"])];

    let first = sync.run(&jobs).await;
    assert_eq!(first.uploaded(), 1);
    assert_eq!(store.uploaded_keys(), vec!["logs/en/2024/01/access.log.gz".to_string()]);
    // The whole tree is compressed, matching or not.
    assert!(src.join("notes.txt.gz").exists());

    let second = sync.run(&jobs).await;
    assert_eq!(second.uploaded(), 0);
    assert_eq!(second.skipped(), 0);
    assert_eq!(store.uploaded_keys().len(), 1);

    let third = sync.run(&[Job::with_includes(&src, "logs/en", &["*.log.gz"])]).await;
    assert_eq!(third.skipped(), 1);
    assert_eq!(
        third.jobs[0].files[0].outcome,
        TransferOutcome::Skipped(SkipReason::ExistsRemote)
    );
    assert_eq!(store.uploaded_keys().len(), 1);
}

#[tokio::test]
async fn test_uncompressed_sync_keeps_local_files() {
    let root = tempfile::tempdir().unwrap();
    let src = root.path().join("img");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("a.log"), b"a").unwrap();
    fs::write(src.join("b.log"), b"b").unwrap();

    let store = RecordingStore::new("logs");
    let (console, _) = Console::capture();
    let sync = SyncOrchestrator::new(store.clone(), store.clone(), GzipTransform::default(), options(false))
        .with_console(console);

    let report = sync.run(&[Job::with_includes(&src, "img", &["*"])]).await;

    assert!(report.is_success());
    assert!(src.join("a.log").exists());
    assert_eq!(store.uploaded_keys(), vec!["img/a.log".to_string(), "img/b.log".to_string()]);
    assert_eq!(store.inner.read("logs", "img/b.log").await.unwrap(), b"b");
}

#[tokio::test]
async fn test_unknown_probe_uploads_by_default() {
    let root = tempfile::tempdir().unwrap();
    fs::write(root.path().join("a.log"), b"a").unwrap();

    let store = RecordingStore::forced("logs", RemoteState::Unknown);
    let (console, _) = Console::capture();
    let opts = options(false);
    assert_eq!(opts.unknown_remote, UnknownRemotePolicy::Upload);
    let sync = SyncOrchestrator::new(store.clone(), store.clone(), GzipTransform::default(), opts)
        .with_console(console);

    let report = sync.run(&[Job::with_includes(root.path(), "x", &["*"])]).await;

    assert_eq!(report.uploaded(), 1);
    assert_eq!(store.uploaded_keys(), vec!["x/a.log".to_string()]);
}

#[tokio::test]
async fn test_jobs_are_isolated() {
    let root = tempfile::tempdir().unwrap();
    let dirs = ["atm", "en", "img", "naif"];
    for dir in dirs {
        let src = root.path().join(dir);
        fs::create_dir_all(&src).unwrap();
        for i in 0..5 {
            fs::write(src.join(format!("access-{i}.log")), format!("{dir}-{i}")).unwrap();
        }
    }

    let mut jobs: Vec<Job> = dirs
        .iter()
        .map(|dir| Job::with_includes(root.path().join(dir), format!("logs/{dir}"), &["*.log"]))
        .collect();
    jobs.push(Job::with_includes(root.path().join("missing"), "logs/missing", &["*"]));

    let store = RecordingStore::new("logs");
    let (console, captured) = Console::capture();
    let sync = SyncOrchestrator::new(store.clone(), store.clone(), GzipTransform::default(), options(true))
        .with_console(console);

    let report = sync.run(&jobs).await;

    assert!(!report.is_success());
    assert_eq!(report.jobs.len(), 5);
    assert_eq!(report.uploaded(), 20);
    assert!(report.jobs[4].error.is_some());
    for (job, dir) in report.jobs.iter().zip(dirs) {
        assert!(job.is_success());
        assert!(job.files.iter().all(|f| f.key.starts_with(&format!("logs/{dir}/"))));
    }

    let summaries = captured
        .lines()
        .into_iter()
        .filter(|l| l.contains(" sync to "))
        .count();
    assert_eq!(summaries, 5);
}
