//! In-place gzip compression of source trees.
//!
//! The gzip magic bytes decide whether a file is compressed; the `.gz`
//! extension only marks files that are skipped without being opened.

use flate2::write::GzEncoder;
use flate2::Compression as GzipCompression;
use jwalk::WalkDir;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};

/// Leading bytes of every gzip stream.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Suffix appended to compressed files and remote keys.
pub const GZIP_SUFFIX: &str = ".gz";

/// Compression level (1-9, where 1 is fastest-lowest and 9 is slowest-highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionLevel(u8);

impl Default for CompressionLevel {
    fn default() -> Self {
        Self(6)
    }
}

impl CompressionLevel {
    /// Create a new compression level (clamped to 1-9).
    pub fn new(level: u8) -> Self {
        Self(level.clamp(1, 9))
    }

    pub fn fast() -> Self {
        Self(1)
    }

    pub fn max() -> Self {
        Self(9)
    }

    /// Get the level value.
    pub fn value(&self) -> u8 {
        self.0
    }
}

/// Outcome counts of one pass over a tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompressionStats {
    /// Files gzipped by this pass.
    pub compressed: usize,
    /// Files already gzipped (by magic bytes or name).
    pub skipped: usize,
    /// Files that could not be compressed.
    pub failed: usize,
}

/// Check the first two bytes of `path` for the gzip magic sequence.
///
/// Unreadable or shorter-than-two-byte files are not compressed.
pub fn is_compressed(path: &Path) -> bool {
    let mut magic = [0u8; 2];
    match File::open(path).and_then(|mut f| f.read_exact(&mut magic)) {
        Ok(()) => magic == GZIP_MAGIC,
        Err(_) => false,
    }
}

/// `path` with `.gz` appended to its final component.
pub fn gz_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(GZIP_SUFFIX);
    PathBuf::from(os)
}

pub fn has_gz_suffix(name: &str) -> bool {
    name.ends_with(GZIP_SUFFIX)
}

const STAGING_SUFFIX: &str = ".gz.tmp";

/// Hidden sibling `.name.gz.tmp` that a compression is written to first.
fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}{}", name, STAGING_SUFFIX))
}

fn discard_staging(staging: &Path) {
    if let Err(e) = fs::remove_file(staging) {
        warn!(path = %staging.display(), error = %e, "Failed to remove partial gzip file");
    }
}

fn is_staging_name(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(STAGING_SUFFIX)
}

/// Gzips files in place, replacing `name` with `name.gz`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GzipTransform {
    level: CompressionLevel,
}

impl GzipTransform {
    pub fn new(level: CompressionLevel) -> Self {
        Self { level }
    }

    pub fn level(&self) -> CompressionLevel {
        self.level
    }

    /// Stream `path` into `path.gz`, then remove `path`.
    ///
    /// The data is written to a hidden temporary sibling, synced, then renamed
    /// to `path.gz`. An existing `path.gz` is never touched: the file is
    /// refused with `AlreadyExists`. The original is removed only after the
    /// rename. On failure only the temporary file is removed.
    pub fn compress_in_place(&self, path: &Path) -> Result<PathBuf> {
        let target = gz_path(path);
        let compression_err = |source: io::Error| SyncError::Compression {
            path: path.to_path_buf(),
            source,
        };

        if target.exists() {
            return Err(compression_err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", target.display()),
            )));
        }

        let staging = staging_path(path);
        self.write_compressed(path, &staging).map_err(compression_err)?;
        if let Err(source) = fs::rename(&staging, &target) {
            discard_staging(&staging);
            return Err(compression_err(source));
        }

        fs::remove_file(path).map_err(compression_err)?;

        Ok(target)
    }

    /// Write a gzip copy of `source` to a new file at `staging`.
    ///
    /// Fails without touching anything if `staging` already exists. A file
    /// created here is removed again on error.
    fn write_compressed(&self, source: &Path, staging: &Path) -> io::Result<()> {
        let mut reader = BufReader::new(File::open(source)?);
        let out = OpenOptions::new().write(true).create_new(true).open(staging)?;

        let written = (|| -> io::Result<()> {
            let mut encoder = GzEncoder::new(
                BufWriter::new(out),
                GzipCompression::new(self.level.value() as u32),
            );
            io::copy(&mut reader, &mut encoder)?;

            let mut writer = encoder.finish()?;
            writer.flush()?;
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()
        })();

        if written.is_err() {
            discard_staging(staging);
        }
        written
    }

    /// Compress every regular file under `dir` that is not already gzipped.
    ///
    /// A failure on one file is logged and the walk continues.
    pub fn ensure_tree_compressed(&self, dir: &Path) -> CompressionStats {
        let mut stats = CompressionStats::default();

        // Collect first so the walk never sees the `.gz` files it produces.
        let files: Vec<PathBuf> = WalkDir::new(dir)
            .skip_hidden(false)
            .follow_links(false)
            .sort(true)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) if entry.file_type().is_file() => Some(entry.path()),
                Ok(_) => None,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Failed to read entry during compression walk");
                    None
                }
            })
            .collect();

        for path in files {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            if is_staging_name(&name) {
                debug!(path = %path.display(), "Leftover staging file, not compressing");
                stats.skipped += 1;
                continue;
            }

            if is_compressed(&path) {
                debug!(path = %path.display(), "File already gzipped");
                stats.skipped += 1;
                continue;
            }

            if has_gz_suffix(&name) {
                debug!(path = %path.display(), "File already has .gz extension");
                stats.skipped += 1;
                continue;
            }

            match self.compress_in_place(&path) {
                Ok(target) => {
                    info!(from = %path.display(), to = %target.display(), "Gzipped file in place");
                    stats.compressed += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Error gzipping file");
                    stats.failed += 1;
                }
            }
        }

        stats
    }
}
