use async_trait::async_trait;
use std::path::Path;

use crate::sync::progress::ProgressSink;

/// Content type for gzip objects.
pub const GZIP_CONTENT_TYPE: &str = "application/gzip";
/// Content type for everything else.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Content type of an object by its key suffix.
pub fn content_type_for(key: &str) -> &'static str {
    if key.ends_with(".gz") {
        GZIP_CONTENT_TYPE
    } else {
        DEFAULT_CONTENT_TYPE
    }
}

/// Result of probing the object store for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteState {
    Present,
    Absent,
    /// The probe failed for a reason other than not-found.
    Unknown,
}

/// Probes the object store for a key's presence.
///
/// Implementations never fail: errors other than not-found are logged
/// with their cause and reported as [`RemoteState::Unknown`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteExistenceChecker: Send + Sync {
    async fn exists(&self, bucket: &str, key: &str) -> RemoteState;
}

/// Transfers one local file to one remote key.
///
/// Returns `false` after logging on any failure. No retries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
        progress: Option<ProgressSink>,
    ) -> bool;
}
