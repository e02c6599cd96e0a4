//! Error types for the sync engine.
//!
//! Only configuration errors stop a job; the other variants are logged
//! and recorded against a single file.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Bad or missing source directory, empty job list, bad config values.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// I/O failure while gzipping a file in place.
    #[error("failed to compress {}: {source}", path.display())]
    Compression {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Existence probe failed for a reason other than not-found.
    #[error("existence probe for {bucket}/{key} failed: {reason}")]
    Probe {
        bucket: String,
        key: String,
        reason: String,
    },

    /// Upload of a local file failed.
    #[error("transfer of {} to {key} failed: {reason}", path.display())]
    Transfer {
        path: PathBuf,
        key: String,
        reason: String,
    },

    /// Progress text that does not follow the transfer layer's grammar.
    #[error("malformed progress text: {0:?}")]
    Progress(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SyncError {
    /// Whether this error ends the job it occurred in.
    pub fn is_fatal_to_job(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_configuration_is_fatal() {
        assert!(SyncError::Configuration("missing".into()).is_fatal_to_job());

        let compression = SyncError::Compression {
            path: PathBuf::from("/tmp/a.log"),
            source: io::Error::new(io::ErrorKind::Other, "disk full"),
        };
        assert!(!compression.is_fatal_to_job());
        assert_eq!(
            compression.to_string(),
            "failed to compress /tmp/a.log: disk full"
        );
    }
}
