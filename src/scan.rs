//! Bootstrap scan: convert everything already sitting in the watched tree.
//!
//! Run once at startup (and by the `scan` command) so files that arrived
//! while nobody was watching get the same treatment as live events:
//!
//! ```text
//! WalkDir (sorted, hidden entries skipped)
//!     │
//!     ▼
//! regular files ──par_iter──▶ Pipeline::transcode     (parallel, rayon)
//!     │
//!     ▼
//! newly written ──in walk order──▶ Pipeline::record   (serial, manifest lock)
//! ```
//!
//! Transcoding is the slow part and touches only each asset's own files.
//! The manifest is recorded afterwards, one asset at a time, in walk order,
//! so the resulting manifest does not depend on how rayon scheduled the
//! work.
//!
//! The walk is always recursive, whatever `watch.recursive` says.

use crate::convert::{ConvertError, Pipeline, Transcoded};
use crate::imaging::Transcoder;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Counts from one bootstrap scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub converted: usize,
    pub already_converted: usize,
    pub unsupported: usize,
    pub failed: usize,
    /// Conversions that succeeded but could not be recorded in the manifest.
    pub manifest_failures: usize,
}

impl ScanSummary {
    pub fn total(&self) -> usize {
        self.converted + self.already_converted + self.unsupported + self.failed
    }
}

/// Convert every eligible file under `root` and record the new ones in the
/// pipeline's manifest.
pub fn scan_existing<T: Transcoder>(root: &Path, pipeline: &Pipeline<T>) -> ScanSummary {
    let files = collect_files(root);
    tracing::info!(root = %root.display(), files = files.len(), "bootstrap scan");

    let transcoded: Vec<(PathBuf, Result<Transcoded, ConvertError>)> = files
        .into_par_iter()
        .map(|path| {
            let result = pipeline.transcode(&path);
            (path, result)
        })
        .collect();

    let mut summary = ScanSummary::default();
    for (path, result) in transcoded {
        match result {
            Ok(Transcoded::Unsupported) => summary.unsupported += 1,
            Ok(Transcoded::AlreadyConverted { .. }) => summary.already_converted += 1,
            Ok(Transcoded::Written { output }) => {
                summary.converted += 1;
                if pipeline.record(&path, &output).is_err() {
                    summary.manifest_failures += 1;
                }
            }
            Err(_) => summary.failed += 1,
        }
    }

    tracing::info!(
        converted = summary.converted,
        already_converted = summary.already_converted,
        failed = summary.failed,
        manifest_failures = summary.manifest_failures,
        "bootstrap scan complete"
    );
    summary
}

/// Regular files under `root`, depth first, sorted by name within each
/// directory.
fn collect_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

    for entry in walker {
        match entry {
            Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "skipping unreadable entry"),
        }
    }
    files
}

// Editor swap files and dot-directories.
fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}
