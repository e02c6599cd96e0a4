use anyhow::{Context, Result};
use async_trait::async_trait;
use opendal::{services::Memory, services::S3, ErrorKind, Operator};
use std::collections::HashMap;
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::{debug, error, info, warn};

use crate::error::SyncError;
use crate::store::backend::{content_type_for, RemoteExistenceChecker, RemoteState, Uploader};
use crate::sync::progress::ProgressSink;

/// Size of each chunk streamed to the store.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Connection settings for an S3 or S3-compatible bucket.
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible providers (MinIO, R2, ...).
    pub endpoint: Option<String>,
}

impl S3Settings {
    pub fn new(bucket: &str, region: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            region: region.to_string(),
            endpoint: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = Some(endpoint.to_string());
        self
    }
}

/// Object store backed by OpenDAL operators, one per bucket.
pub struct ObjectStore {
    operators: HashMap<String, Operator>,
    chunk_size: usize,
}

impl ObjectStore {
    /// A store with no buckets.
    pub fn new() -> Self {
        Self {
            operators: HashMap::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Connect to an S3 bucket.
    ///
    /// Credentials come from the standard AWS chain (environment, shared
    /// credentials file, instance profile).
    pub fn s3(settings: &S3Settings) -> Result<Self> {
        let mut builder = S3::default()
            .bucket(&settings.bucket)
            .region(&settings.region);

        if let Some(endpoint) = &settings.endpoint {
            builder = builder.endpoint(endpoint);
        }

        let operator = Operator::new(builder)
            .context("Failed to configure S3 operator")?
            .finish();

        info!(bucket = %settings.bucket, region = %settings.region, "Configured S3 bucket");
        Ok(Self::new().with_operator(&settings.bucket, operator))
    }

    /// An in-memory bucket.
    pub fn memory(bucket: &str) -> Result<Self> {
        let operator = Operator::new(Memory::default())
            .context("Failed to configure in-memory operator")?
            .finish();
        Ok(Self::new().with_operator(bucket, operator))
    }

    pub fn with_operator(mut self, bucket: &str, operator: Operator) -> Self {
        self.operators.insert(bucket.to_string(), operator);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// The operator serving `bucket`, if configured.
    pub fn operator(&self, bucket: &str) -> Option<&Operator> {
        self.operators.get(bucket)
    }

    /// Read back a whole object.
    pub async fn read(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let operator = self
            .operator(bucket)
            .with_context(|| format!("No operator for bucket {}", bucket))?;
        let content = operator
            .read(normalize_key(key))
            .await
            .with_context(|| format!("Failed to read {}/{}", bucket, key))?;
        Ok(content.to_vec())
    }

    async fn put_file(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
        progress: Option<&ProgressSink>,
    ) -> std::result::Result<u64, SyncError> {
        let transfer_err = |reason: String| SyncError::Transfer {
            path: local_path.to_path_buf(),
            key: key.to_string(),
            reason,
        };

        let operator = self
            .operator(bucket)
            .ok_or_else(|| transfer_err(format!("no operator configured for bucket {}", bucket)))?;

        let mut file = tokio::fs::File::open(local_path).await?;
        let total = file.metadata().await?.len();

        let mut request = operator.writer_with(normalize_key(key));
        if operator.info().full_capability().write_with_content_type {
            request = request.content_type(content_type_for(key));
        }
        let mut writer = request.await.map_err(|e| transfer_err(e.to_string()))?;

        let mut sent = 0u64;
        let mut buf = vec![0u8; self.chunk_size];
        loop {
            let n = match file.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    let _ = writer.abort().await;
                    return Err(e.into());
                }
            };

            if let Err(e) = writer.write(buf[..n].to_vec()).await {
                let _ = writer.abort().await;
                return Err(transfer_err(e.to_string()));
            }

            sent += n as u64;
            if let Some(sink) = progress {
                sink.emit(sent, total);
            }
        }

        writer.close().await.map_err(|e| transfer_err(e.to_string()))?;

        if total == 0 {
            if let Some(sink) = progress {
                sink.emit(0, 0);
            }
        }

        Ok(sent)
    }
}

impl Default for ObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_key(key: &str) -> &str {
    key.trim_start_matches('/')
}

#[async_trait]
impl RemoteExistenceChecker for ObjectStore {
    async fn exists(&self, bucket: &str, key: &str) -> RemoteState {
        let Some(operator) = self.operator(bucket) else {
            let err = SyncError::Probe {
                bucket: bucket.to_string(),
                key: key.to_string(),
                reason: "no operator configured for bucket".to_string(),
            };
            warn!(error = %err, "Existence check failed");
            return RemoteState::Unknown;
        };

        match operator.stat(normalize_key(key)).await {
            Ok(_) => RemoteState::Present,
            Err(e) if e.kind() == ErrorKind::NotFound => RemoteState::Absent,
            Err(e) => {
                let err = SyncError::Probe {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    reason: e.to_string(),
                };
                warn!(error = %err, kind = ?e.kind(), "Existence check failed");
                RemoteState::Unknown
            }
        }
    }
}

#[async_trait]
impl Uploader for ObjectStore {
    async fn upload(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
        progress: Option<ProgressSink>,
    ) -> bool {
        match self.put_file(local_path, bucket, key, progress.as_ref()).await {
            Ok(bytes) => {
                debug!(path = %local_path.display(), bucket, key, bytes, "Uploaded file");
                true
            }
            Err(e) => {
                error!(path = %local_path.display(), bucket, key, error = %e, "Upload failed");
                false
            }
        }
    }
}
