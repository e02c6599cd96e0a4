//! Directory sync module
//!
//! Include-pattern filtering, in-place gzip, progress rendering and the
//! orchestrator that ties them to the object store.

pub mod compression;
pub mod console;
pub mod engine;
pub mod pattern;
pub mod progress;

pub use compression::{is_compressed, CompressionLevel, CompressionStats, GzipTransform};
pub use console::Console;
pub use engine::{
    FileCandidate, FileReport, Job, JobReport, RunReport, SkipReason, SyncOptions, SyncOrchestrator,
    TransferOutcome, UnknownRemotePolicy,
};
pub use pattern::PatternMatcher;
pub use progress::{bytes_of, human_size, ProgressReporter, ProgressSink, TransferProgress};
