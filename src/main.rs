use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

use logsync::config::{default_config_path, Config};
use logsync::store::{ObjectStore, S3Settings};
use logsync::sync::{GzipTransform, SyncOptions, SyncOrchestrator, UnknownRemotePolicy};

/// Sync log directories to an S3 bucket with optional in-place gzip.
#[derive(Parser, Debug)]
#[command(name = "logsync", version, about)]
struct Cli {
    /// Path to the configuration file (YAML, or TOML with a .toml extension)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base directory containing the log subdirectories to sync
    #[arg(short = 'd', long)]
    log_directory: PathBuf,

    /// Override the bucket from the configuration file
    #[arg(long)]
    bucket: Option<String>,

    /// Disable gzip compression; files are synced as-is
    #[arg(long)]
    no_gzip: bool,

    /// Number of directories synced concurrently (default: CPU count)
    #[arg(short, long)]
    workers: Option<usize>,

    /// What to do when the existence check fails: upload or skip
    #[arg(long)]
    unknown_remote: Option<UnknownRemotePolicy>,

    /// Log filter (RUST_LOG takes precedence)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn apply_overrides(&self, options: &mut SyncOptions) {
        if let Some(bucket) = &self.bucket {
            options.bucket = bucket.clone();
        }
        if self.no_gzip {
            options.compress = false;
        }
        if let Some(workers) = self.workers {
            options.workers = workers.max(1);
        }
        if let Some(policy) = self.unknown_remote {
            options.unknown_remote = policy;
        }
    }
}

fn load(cli: &Cli) -> Result<(Config, SyncOptions)> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => default_config_path().context("No --config given and no platform config directory")?,
    };
    let config = Config::load(&path)?;

    let mut options = config.sync_options();
    cli.apply_overrides(&mut options);
    Ok((config, options))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    if let Err(e) = logsync::logging::init(&cli.log_level) {
        eprintln!("Failed to initialise logging: {:#}", e);
    }

    let (config, options) = match load(&cli) {
        Ok(loaded) => loaded,
        Err(e) => {
            error!(error = ?e, "Failed to load configuration");
            eprintln!("Error: {:#}", e);
            return ExitCode::from(2);
        }
    };

    let mut settings = S3Settings::new(&options.bucket, config.region());
    if let Some(endpoint) = &config.endpoint {
        settings = settings.with_endpoint(endpoint);
    }
    let store = match ObjectStore::s3(&settings) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(error = ?e, "Failed to configure object store");
            eprintln!("Error: {:#}", e);
            return ExitCode::from(2);
        }
    };

    let jobs = config.jobs(&cli.log_directory);
    let orchestrator = SyncOrchestrator::new(
        store.clone(),
        store,
        GzipTransform::new(config.compression_level()),
        options,
    );

    let report = orchestrator.run(&jobs).await;
    info!(
        jobs = report.jobs.len(),
        uploaded = report.uploaded(),
        skipped = report.skipped(),
        failed = report.failed(),
        "Done"
    );

    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
