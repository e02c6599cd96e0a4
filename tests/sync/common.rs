// Shared fixtures for sync integration tests

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use logsync::store::{ObjectStore, RemoteExistenceChecker, RemoteState, Uploader};
use logsync::sync::ProgressSink;

pub fn gzip_bytes(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// In-memory store that records every probe and upload and can be forced
/// to answer probes with a fixed state.
pub struct RecordingStore {
    pub inner: ObjectStore,
    pub forced_state: Option<RemoteState>,
    pub probes: Mutex<Vec<String>>,
    pub uploads: Mutex<Vec<String>>,
}

impl RecordingStore {
    pub fn new(bucket: &str) -> Arc<Self> {
        Arc::new(Self::with_state(bucket, None))
    }

    pub fn forced(bucket: &str, state: RemoteState) -> Arc<Self> {
        Arc::new(Self::with_state(bucket, Some(state)))
    }

    fn with_state(bucket: &str, forced_state: Option<RemoteState>) -> Self {
        Self {
            inner: ObjectStore::memory(bucket).unwrap(),
            forced_state,
            probes: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn uploaded_keys(&self) -> Vec<String> {
        let mut keys = self.uploads.lock().unwrap().clone();
        keys.sort();
        keys
    }
}

#[async_trait]
impl RemoteExistenceChecker for RecordingStore {
    async fn exists(&self, bucket: &str, key: &str) -> RemoteState {
        self.probes.lock().unwrap().push(key.to_string());
        match self.forced_state {
            Some(state) => state,
            None => self.inner.exists(bucket, key).await,
        }
    }
}

#[async_trait]
impl Uploader for RecordingStore {
    async fn upload(&self, local_path: &Path, bucket: &str, key: &str, progress: Option<ProgressSink>) -> bool {
        self.uploads.lock().unwrap().push(key.to_string());
        self.inner.upload(local_path, bucket, key, progress).await
    }
}
