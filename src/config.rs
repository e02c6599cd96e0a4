//! Sync configuration: file loading, environment substitution and job
//! expansion.
//!
//! The file maps `subdirs.<dir>.<subdir>` to pattern groups. Every entry
//! becomes one job syncing `<log_dir>/<dir>/<subdir>` to
//! `<s3_logdir>/<dir>/<subdir>`.

use anyhow::{bail, Context, Result};
use regex::{Captures, Regex};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info};

use crate::sync::compression::CompressionLevel;
use crate::sync::engine::{Job, SyncOptions, UnknownRemotePolicy};

pub const DEFAULT_REGION: &str = "us-east-1";

/// Pattern groups of one sub-directory: group name -> globs.
pub type PatternGroups = BTreeMap<String, Vec<String>>;

/// On-disk configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub s3_bucket: String,
    #[serde(default)]
    pub s3_logdir: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_gzip")]
    pub gzip: bool,
    #[serde(default)]
    pub compression_level: Option<u8>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub unknown_remote: UnknownRemotePolicy,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub subdirs: BTreeMap<String, BTreeMap<String, PatternGroups>>,
}

fn default_gzip() -> bool {
    true
}

/// File formats the loader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
}

impl ConfigFormat {
    /// TOML for `.toml` files, YAML otherwise.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::Toml,
            _ => Self::Yaml,
        }
    }
}

/// Platform default config location (`<config dir>/logsync/config.yaml`).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("logsync").join("config.yaml"))
}

fn env_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("valid env pattern")
    })
}

/// Replace `${VAR}` and `${VAR:-default}` using `lookup`.
///
/// A variable that is unset and has no default is an error.
pub fn substitute_env_with<F>(raw: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut missing = Vec::new();
    let substituted = env_pattern().replace_all(raw, |caps: &Captures| {
        let name = &caps[1];
        match (lookup(name), caps.get(2)) {
            (Some(value), _) => value,
            (None, Some(default)) => default.as_str().to_string(),
            (None, None) => {
                missing.push(name.to_string());
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        bail!("Environment variable(s) not set: {}", missing.join(", "));
    }
    Ok(substituted.into_owned())
}

/// [`substitute_env_with`] against the process environment.
pub fn substitute_env(raw: &str) -> Result<String> {
    substitute_env_with(raw, |name| std::env::var(name).ok())
}

impl Config {
    /// Parse configuration text in the given format after env substitution.
    pub fn parse(raw: &str, format: ConfigFormat) -> Result<Self> {
        let content = substitute_env(raw)?;
        let config: Config = match format {
            ConfigFormat::Yaml => serde_yaml::from_str(&content).context("Failed to parse config YAML")?,
            ConfigFormat::Toml => toml::from_str(&content).context("Failed to parse config TOML")?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load a config file.
    pub fn load(path: &Path) -> Result<Self> {
        info!(config_path = %path.display(), "Loading configuration from file");
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::parse(&raw, ConfigFormat::from_path(path))?;
        info!(
            bucket = %config.s3_bucket,
            prefix = %config.s3_logdir,
            jobs = config.job_count(),
            "Config loaded"
        );
        debug!(?config, "Config loaded (full debug)");
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.s3_bucket.trim().is_empty() {
            bail!("s3_bucket must not be empty");
        }
        if let Some(level) = self.compression_level {
            if !(1..=9).contains(&level) {
                bail!("compression_level must be between 1 and 9, got {}", level);
            }
        }
        if self.workers == Some(0) {
            bail!("workers must be at least 1");
        }
        Ok(())
    }

    pub fn job_count(&self) -> usize {
        self.subdirs.values().map(BTreeMap::len).sum()
    }

    /// Expand `subdirs` into jobs rooted at `log_dir`, sorted by directory
    /// then sub-directory.
    pub fn jobs(&self, log_dir: &Path) -> Vec<Job> {
        let prefix_root = self.s3_logdir.trim_matches('/');
        self.subdirs
            .iter()
            .flat_map(|(dir, subdirs)| {
                subdirs.iter().map(move |(subdir, groups)| {
                    let relative = format!("{}/{}", dir, subdir);
                    let dest_prefix = if prefix_root.is_empty() {
                        relative
                    } else {
                        format!("{}/{}", prefix_root, relative)
                    };
                    Job::new(log_dir.join(dir).join(subdir), dest_prefix, groups.clone())
                })
            })
            .collect()
    }

    pub fn region(&self) -> &str {
        self.region.as_deref().unwrap_or(DEFAULT_REGION)
    }

    pub fn compression_level(&self) -> CompressionLevel {
        self.compression_level
            .map(CompressionLevel::new)
            .unwrap_or_default()
    }

    /// Run options from the file, before CLI overrides.
    pub fn sync_options(&self) -> SyncOptions {
        let mut options = SyncOptions::new(self.s3_bucket.clone());
        options.compress = self.gzip;
        if let Some(workers) = self.workers {
            options.workers = workers;
        }
        options.unknown_remote = self.unknown_remote;
        options.request_timeout = self.request_timeout_secs.map(Duration::from_secs);
        options
    }
}
