//! Directory-to-object-store sync orchestration.
//!
//! Each job walks one source directory, optionally gzips the tree in place,
//! and uploads every matching file whose remote key is not already present.
//! Jobs are independent and run concurrently on a bounded worker pool; the
//! work inside one job is strictly sequential.
//!
//! Per file: `Discovered -> [Compressed] -> Checked -> Uploaded | Skipped | Failed`.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use jwalk::WalkDir;
use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::error::SyncError;
use crate::store::{RemoteExistenceChecker, RemoteState, Uploader};
use crate::sync::compression::{gz_path, has_gz_suffix, is_compressed, CompressionStats, GzipTransform, GZIP_SUFFIX};
use crate::sync::console::Console;
use crate::sync::pattern::PatternMatcher;
use crate::sync::progress::ProgressSink;

/// What to do when the existence probe cannot tell whether a key exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownRemotePolicy {
    /// Treat the key as absent and upload.
    #[default]
    Upload,
    /// Treat the key as present and skip.
    Skip,
}

impl FromStr for UnknownRemotePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "upload" => Ok(Self::Upload),
            "skip" => Ok(Self::Skip),
            other => Err(format!("unknown policy '{}', expected 'upload' or 'skip'", other)),
        }
    }
}

impl<'de> Deserialize<'de> for UnknownRemotePolicy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One source directory synced to one destination prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub source_dir: PathBuf,
    pub dest_prefix: String,
    /// Named groups of include globs. Names only organise the patterns.
    pub pattern_groups: BTreeMap<String, Vec<String>>,
}

impl Job {
    pub fn new(
        source_dir: impl Into<PathBuf>,
        dest_prefix: impl Into<String>,
        pattern_groups: BTreeMap<String, Vec<String>>,
    ) -> Self {
        Self {
            source_dir: source_dir.into(),
            dest_prefix: dest_prefix.into(),
            pattern_groups,
        }
    }

    /// A job with a single `include` group.
    pub fn with_includes<S: AsRef<str>>(
        source_dir: impl Into<PathBuf>,
        dest_prefix: impl Into<String>,
        includes: &[S],
    ) -> Self {
        let mut groups = BTreeMap::new();
        groups.insert(
            "include".to_string(),
            includes.iter().map(|p| p.as_ref().to_string()).collect(),
        );
        Self::new(source_dir, dest_prefix, groups)
    }

    /// All groups flattened into one list, duplicates removed.
    pub fn include_patterns(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.pattern_groups
            .values()
            .flatten()
            .filter(|p| seen.insert(p.as_str()))
            .cloned()
            .collect()
    }

    /// Remote key for a path relative to the source directory.
    ///
    /// `dest_prefix/relative/path`, with `.gz` appended when compressing and
    /// the path does not already end in `.gz`.
    pub fn remote_key(&self, relative_path: &Path, compress: bool) -> String {
        let relative = relative_path
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/");

        let prefix = self.dest_prefix.trim_matches('/');
        let mut key = if prefix.is_empty() {
            relative
        } else {
            format!("{}/{}", prefix, relative)
        };

        if compress && !has_gz_suffix(&key) {
            key.push_str(GZIP_SUFFIX);
        }
        key
    }

    fn label(&self) -> String {
        self.source_dir.display().to_string()
    }
}

/// A file selected for transfer during the tree walk.
#[derive(Debug, Clone)]
pub struct FileCandidate {
    pub absolute_path: PathBuf,
    pub relative_path: PathBuf,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub matched_pattern: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    ExistsRemote,
    /// Probe result was unknown and the policy says skip.
    UnknownRemote,
}

/// Terminal state of one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Uploaded,
    Skipped(SkipReason),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct FileReport {
    pub relative_path: PathBuf,
    pub key: String,
    pub outcome: TransferOutcome,
}

/// Result of one job.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub source_dir: PathBuf,
    pub dest_prefix: String,
    pub files: Vec<FileReport>,
    /// Bytes of successfully uploaded local files.
    pub bytes_uploaded: u64,
    pub compression: Option<CompressionStats>,
    /// Set when the job could not run at all.
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl JobReport {
    fn new(job: &Job) -> Self {
        Self {
            source_dir: job.source_dir.clone(),
            dest_prefix: job.dest_prefix.clone(),
            files: Vec::new(),
            bytes_uploaded: 0,
            compression: None,
            error: None,
            elapsed: Duration::ZERO,
        }
    }

    fn count(&self, pred: impl Fn(&TransferOutcome) -> bool) -> usize {
        self.files.iter().filter(|f| pred(&f.outcome)).count()
    }

    pub fn uploaded(&self) -> usize {
        self.count(|o| matches!(o, TransferOutcome::Uploaded))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, TransferOutcome::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, TransferOutcome::Failed(_)))
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.failed() == 0
    }

    /// The terminal per-job summary line.
    pub fn summary_line(&self) -> String {
        match &self.error {
            Some(error) => format!(
                "{} sync to {}: failed after {:.2}s - {}",
                self.source_dir.display(),
                self.dest_prefix,
                self.elapsed.as_secs_f64(),
                error
            ),
            None => format!(
                "{} sync to {}: {} uploaded, {} skipped, {} failed in {:.2}s",
                self.source_dir.display(),
                self.dest_prefix,
                self.uploaded(),
                self.skipped(),
                self.failed(),
                self.elapsed.as_secs_f64()
            ),
        }
    }
}

/// Aggregate result of a run, in job order.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub jobs: Vec<JobReport>,
}

impl RunReport {
    /// True iff there was at least one job and every job succeeded.
    pub fn is_success(&self) -> bool {
        !self.jobs.is_empty() && self.jobs.iter().all(JobReport::is_success)
    }

    pub fn uploaded(&self) -> usize {
        self.jobs.iter().map(JobReport::uploaded).sum()
    }

    pub fn skipped(&self) -> usize {
        self.jobs.iter().map(JobReport::skipped).sum()
    }

    pub fn failed(&self) -> usize {
        self.jobs.iter().map(JobReport::failed).sum()
    }

    pub fn bytes_uploaded(&self) -> u64 {
        self.jobs.iter().map(|j| j.bytes_uploaded).sum()
    }
}

/// Run-wide settings.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub bucket: String,
    /// Gzip source trees in place before uploading.
    pub compress: bool,
    /// Maximum number of jobs running at once.
    pub workers: usize,
    pub unknown_remote: UnknownRemotePolicy,
    /// Bound on each probe and upload call.
    pub request_timeout: Option<Duration>,
}

impl SyncOptions {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            compress: true,
            workers: num_cpus::get(),
            unknown_remote: UnknownRemotePolicy::default(),
            request_timeout: None,
        }
    }
}

/// Drives jobs against injected store collaborators.
pub struct SyncOrchestrator {
    checker: Arc<dyn RemoteExistenceChecker>,
    uploader: Arc<dyn Uploader>,
    compressor: GzipTransform,
    options: SyncOptions,
    console: Console,
}

impl SyncOrchestrator {
    pub fn new(
        checker: Arc<dyn RemoteExistenceChecker>,
        uploader: Arc<dyn Uploader>,
        compressor: GzipTransform,
        options: SyncOptions,
    ) -> Self {
        Self {
            checker,
            uploader,
            compressor,
            options,
            console: Console::stdout(),
        }
    }

    /// Send progress and summary lines somewhere other than stdout.
    pub fn with_console(mut self, console: Console) -> Self {
        self.console = console;
        self
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Run every job and aggregate the results.
    ///
    /// Never fails: job-level problems are recorded in the report.
    pub async fn run(&self, jobs: &[Job]) -> RunReport {
        if jobs.is_empty() {
            let err = SyncError::Configuration("no jobs configured".to_string());
            error!(error = %err, "Nothing to sync");
            return RunReport::default();
        }

        let workers = self.options.workers.max(1);
        info!(jobs = jobs.len(), workers, bucket = %self.options.bucket, "Starting sync run");

        let mut reports: Vec<(usize, JobReport)> = stream::iter(jobs.iter().enumerate())
            .map(|(idx, job)| async move { (idx, self.sync_job(job).await) })
            .buffer_unordered(workers)
            .collect()
            .await;
        reports.sort_by_key(|(idx, _)| *idx);

        let report = RunReport {
            jobs: reports.into_iter().map(|(_, r)| r).collect(),
        };
        info!(
            uploaded = report.uploaded(),
            skipped = report.skipped(),
            failed = report.failed(),
            bytes = report.bytes_uploaded(),
            success = report.is_success(),
            "Sync run complete"
        );
        report
    }

    /// Sync a single job and print its summary line.
    pub async fn sync_job(&self, job: &Job) -> JobReport {
        let started = Instant::now();
        let mut report = JobReport::new(job);

        if let Err(e) = self.process_job(job, started, &mut report).await {
            error!(dir = %job.source_dir.display(), error = %e, "Job aborted");
            report.error = Some(e.to_string());
        }

        report.elapsed = started.elapsed();
        self.console.line(&report.summary_line());
        report
    }

    async fn process_job(&self, job: &Job, started: Instant, report: &mut JobReport) -> Result<(), SyncError> {
        let patterns = job.include_patterns();
        if patterns.is_empty() {
            warn!(dir = %job.source_dir.display(), "Job has no include patterns, nothing will match");
        }
        let matcher = PatternMatcher::from_patterns(&patterns);

        let source_dir = job.source_dir.clone();
        let candidates = tokio::task::spawn_blocking(move || discover(&source_dir, &matcher))
            .await
            .map_err(|e| SyncError::Configuration(format!("discovery task failed: {}", e)))??;
        debug!(dir = %job.source_dir.display(), candidates = candidates.len(), "Discovered files");

        if self.options.compress {
            info!(dir = %job.source_dir.display(), "Ensuring files are gzipped");
            let compressor = self.compressor;
            let source_dir = job.source_dir.clone();
            let stats = tokio::task::spawn_blocking(move || compressor.ensure_tree_compressed(&source_dir))
                .await
                .map_err(|e| SyncError::Configuration(format!("compression task failed: {}", e)))?;
            info!(
                dir = %job.source_dir.display(),
                compressed = stats.compressed,
                skipped = stats.skipped,
                failed = stats.failed,
                "Compression pass finished"
            );
            report.compression = Some(stats);
        }

        let progress = ProgressSink::new(job.label(), started, self.console.clone());
        let mut seen_keys = HashSet::new();

        for candidate in candidates {
            let key = job.remote_key(&candidate.relative_path, self.options.compress);
            let (outcome, bytes) = self.transfer(&candidate, &key, &mut seen_keys, &progress).await;
            report.bytes_uploaded += bytes;
            report.files.push(FileReport {
                relative_path: candidate.relative_path,
                key,
                outcome,
            });
        }

        Ok(())
    }

    async fn transfer(
        &self,
        candidate: &FileCandidate,
        key: &str,
        seen_keys: &mut HashSet<String>,
        progress: &ProgressSink,
    ) -> (TransferOutcome, u64) {
        if !seen_keys.insert(key.to_string()) {
            warn!(path = %candidate.absolute_path.display(), key, "Remote key already used by another file in this job");
            return (TransferOutcome::Failed(format!("remote key collision: {}", key)), 0);
        }

        let resolved = {
            let candidate = candidate.clone();
            let compress = self.options.compress;
            tokio::task::spawn_blocking(move || resolve_local(&candidate, compress))
                .await
                .unwrap_or_else(|e| Err(format!("resolve task failed: {}", e)))
        };
        let (local_path, size) = match resolved {
            Ok(resolved) => resolved,
            Err(reason) => {
                warn!(path = %candidate.absolute_path.display(), reason = %reason, "Skipping uncompressed file");
                return (TransferOutcome::Failed(reason), 0);
            }
        };

        match self.probe(key).await {
            RemoteState::Present => {
                debug!(key, "Already present remotely");
                return (TransferOutcome::Skipped(SkipReason::ExistsRemote), 0);
            }
            RemoteState::Unknown if self.options.unknown_remote == UnknownRemotePolicy::Skip => {
                info!(key, "Remote state unknown, skipping per policy");
                return (TransferOutcome::Skipped(SkipReason::UnknownRemote), 0);
            }
            RemoteState::Absent | RemoteState::Unknown => {}
        }

        if self.put(&local_path, key, progress).await {
            info!(path = %local_path.display(), key, bytes = size, "Uploaded");
            (TransferOutcome::Uploaded, size)
        } else {
            let err = SyncError::Transfer {
                path: local_path.clone(),
                key: key.to_string(),
                reason: "upload failed".to_string(),
            };
            (TransferOutcome::Failed(err.to_string()), 0)
        }
    }

    async fn probe(&self, key: &str) -> RemoteState {
        let probe = self.checker.exists(&self.options.bucket, key);
        match self.options.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, probe).await {
                Ok(state) => state,
                Err(_) => {
                    warn!(key, timeout_ms = limit.as_millis() as u64, "Existence check timed out");
                    RemoteState::Unknown
                }
            },
            None => probe.await,
        }
    }

    async fn put(&self, local_path: &Path, key: &str, progress: &ProgressSink) -> bool {
        let upload = self
            .uploader
            .upload(local_path, &self.options.bucket, key, Some(progress.clone()));
        match self.options.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, upload).await {
                Ok(ok) => ok,
                Err(_) => {
                    warn!(key, timeout_ms = limit.as_millis() as u64, "Upload timed out");
                    false
                }
            },
            None => upload.await,
        }
    }
}

/// Walk `source_dir` and collect regular files whose name matches.
pub fn discover(source_dir: &Path, matcher: &PatternMatcher) -> Result<Vec<FileCandidate>, SyncError> {
    std::fs::read_dir(source_dir).map_err(|e| {
        SyncError::Configuration(format!(
            "source directory {} is not readable: {}",
            source_dir.display(),
            e
        ))
    })?;

    let mut candidates = Vec::new();
    for entry in WalkDir::new(source_dir).skip_hidden(false).follow_links(false).sort(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(dir = %source_dir.display(), error = %e, "Failed to read entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(pattern) = matcher.matched_pattern(&name) else {
            continue;
        };

        let absolute_path = entry.path();
        let relative_path = match absolute_path.strip_prefix(source_dir) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => continue,
        };
        let metadata = entry.metadata().ok();

        candidates.push(FileCandidate {
            size: metadata.as_ref().map(|m| m.len()).unwrap_or(0),
            modified: metadata
                .as_ref()
                .and_then(|m| m.modified().ok())
                .map(DateTime::<Utc>::from),
            matched_pattern: pattern.to_string(),
            absolute_path,
            relative_path,
        });
    }

    Ok(candidates)
}

/// The local file to upload for a candidate, with its current size.
fn resolve_local(candidate: &FileCandidate, compress: bool) -> Result<(PathBuf, u64), String> {
    let path = if compress {
        resolve_compressed(candidate)?
    } else {
        candidate.absolute_path.clone()
    };
    let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(candidate.size);
    Ok((path, size))
}

/// The local file to upload for a candidate after the compression pass.
fn resolve_compressed(candidate: &FileCandidate) -> Result<PathBuf, String> {
    let path = &candidate.absolute_path;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if path.exists() && (is_compressed(path) || has_gz_suffix(&name)) {
        return Ok(path.clone());
    }

    let gz = gz_path(path);
    if !path.exists() && is_compressed(&gz) {
        return Ok(gz);
    }

    Err(format!("{} was not compressed", path.display()))
}
