//! Byte-level transfer progress rendering.
//!
//! Transfers report structured [`TransferProgress`] events. Transfer layers
//! that only print text (the AWS CLI's `Completed 1.0 MiB/~4.0 MiB ...`
//! lines) go through [`ProgressReporter::report`], which parses the text
//! into the same event.

use std::time::{Duration, Instant};

use tracing::warn;

use crate::error::{Result, SyncError};
use crate::sync::console::Console;

const SIZE_LABELS: [&str; 9] = ["B", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

/// Bytes in a binary-prefixed unit. Unknown units count as bytes.
pub fn unit_multiplier(unit: &str) -> u64 {
    match unit {
        "KiB" => 1 << 10,
        "MiB" => 1 << 20,
        "GiB" => 1 << 30,
        "TiB" => 1 << 40,
        _ => 1,
    }
}

/// Convert a size with unit to bytes.
pub fn bytes_of(value: f64, unit: &str) -> u64 {
    (value * unit_multiplier(unit) as f64) as u64
}

/// Format a byte count with base-1024 steps and one decimal place.
pub fn human_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0B".to_string();
    }

    let mut idx = 0;
    let mut scaled = bytes as f64;
    while scaled >= 1024.0 && idx < SIZE_LABELS.len() - 1 {
        scaled /= 1024.0;
        idx += 1;
    }

    format!("{:.1}{}", scaled, SIZE_LABELS[idx])
}

/// Throughput in MB/s (2^20 bytes) over `elapsed`.
pub fn throughput_mbps(sent: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        (sent as f64 / (1024.0 * 1024.0)) / secs
    } else {
        0.0
    }
}

/// One progress update of a transfer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferProgress {
    /// Bytes sent so far.
    pub sent: u64,
    /// Total bytes of the transfer.
    pub total: u64,
    /// Time since the transfer (or job) started.
    pub elapsed: Duration,
}

impl TransferProgress {
    /// Fraction complete (0.0 - 1.0). An empty transfer is complete.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.sent as f64 / self.total as f64
    }

    pub fn throughput(&self) -> f64 {
        throughput_mbps(self.sent, self.elapsed)
    }
}

/// Renders progress lines; holds no state between calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressReporter;

impl ProgressReporter {
    /// Parse a transfer-layer progress line into `(sent, total)` bytes.
    ///
    /// Grammar: `<word> <sent> <sent-unit>/<~?total> <total-unit> ...`.
    pub fn parse(raw: &str) -> Result<(u64, u64)> {
        let malformed = || SyncError::Progress(raw.to_string());

        let parts: Vec<&str> = raw.split_whitespace().collect();
        if parts.len() < 4 {
            return Err(malformed());
        }

        let sent: f64 = parts[1].parse().map_err(|_| malformed())?;
        let (sent_unit, total) = parts[2].split_once('/').ok_or_else(malformed)?;
        let total: f64 = total.replace('~', "").parse().map_err(|_| malformed())?;
        let total_unit = parts[3];

        if !sent.is_finite() || !total.is_finite() || sent < 0.0 || total < 0.0 {
            return Err(malformed());
        }

        Ok((bytes_of(sent, sent_unit), bytes_of(total, total_unit)))
    }

    /// Render `{context} - {sent} / {total} - {pct} - {rate} MB/s`.
    pub fn render(&self, progress: &TransferProgress, context: &str) -> String {
        format!(
            "{} - {} / {} - {:.0}% - {:.2} MB/s",
            context,
            human_size(progress.sent),
            human_size(progress.total),
            progress.fraction() * 100.0,
            progress.throughput(),
        )
    }

    /// Parse and render a raw progress line.
    ///
    /// Malformed text is logged and yields `None`.
    pub fn report(&self, raw: &str, context: &str, start: Instant) -> Option<String> {
        match Self::parse(raw) {
            Ok((sent, total)) => {
                let progress = TransferProgress {
                    sent,
                    total,
                    elapsed: start.elapsed(),
                };
                Some(self.render(&progress, context))
            }
            Err(e) => {
                warn!(context, error = %e, "Skipping progress update");
                None
            }
        }
    }
}

/// Writes progress lines for one job to the shared console.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    label: String,
    started: Instant,
    console: Console,
    reporter: ProgressReporter,
}

impl ProgressSink {
    pub fn new(label: impl Into<String>, started: Instant, console: Console) -> Self {
        Self {
            label: label.into(),
            started,
            console,
            reporter: ProgressReporter,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Emit a structured update; elapsed time is measured from job start.
    pub fn emit(&self, sent: u64, total: u64) {
        let progress = TransferProgress {
            sent,
            total,
            elapsed: self.started.elapsed(),
        };
        self.console.line(&self.reporter.render(&progress, &self.label));
    }

    /// Emit a raw text update from a text-only transfer layer.
    pub fn emit_raw(&self, raw: &str) {
        if let Some(line) = self.reporter.report(raw, &self.label, self.started) {
            self.console.line(&line);
        }
    }
}
