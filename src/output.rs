//! CLI output formatting.
//!
//! Paths are shown relative to the watched directory. Each conversion is a
//! header line, followed by an indented manifest line once the manifest step
//! has run:
//!
//! ```text
//! hero.png → hero.webp
//!     index.ts: import added, export added
//! icons/logo.jpg: already converted
//! broken.png: FAILED
//!     Decode failed: unexpected end of file
//!
//! Scanned 12 files: 3 converted, 1 already converted, 1 failed
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>`) for
//! testability and, where the CLI prints it directly, a `print_*` wrapper that
//! writes to stdout. Format functions are pure: no I/O, no side effects.

use crate::convert::ConvertEvent;
use crate::manifest::{ExportChange, ImportChange, SyncReport};
use crate::scan::ScanSummary;
use std::path::Path;

/// `path` relative to `root` when it lies below it, otherwise as given.
fn relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

/// Describe what a manifest sync changed.
///
/// ```text
/// import added, export added
/// import migrated
/// import added, no export block
/// up to date
/// ```
pub fn describe_sync(report: &SyncReport) -> String {
    let mut parts = Vec::new();
    match report.import {
        ImportChange::Added => parts.push("import added"),
        ImportChange::Migrated => parts.push("import migrated"),
        ImportChange::Present => {}
    }
    match report.export {
        ExportChange::Added => parts.push("export added"),
        ExportChange::NoAggregate => parts.push("no export block"),
        ExportChange::Present => {}
    }
    if !report.changed {
        return "up to date".to_string();
    }
    parts.join(", ")
}

/// Format a single pipeline event as display lines.
pub fn format_convert_event(event: &ConvertEvent, root: &Path) -> Vec<String> {
    match event {
        ConvertEvent::Converted { source, output } => vec![format!(
            "{} → {}",
            relative(source, root),
            relative(output, root)
        )],
        ConvertEvent::AlreadyConverted { source, .. } => {
            vec![format!("{}: already converted", relative(source, root))]
        }
        ConvertEvent::Failed { source, reason } => vec![
            format!("{}: FAILED", relative(source, root)),
            format!("    {}", reason),
        ],
        ConvertEvent::ManifestSynced {
            manifest, report, ..
        } => vec![format!(
            "    {}: {}",
            relative(manifest, root),
            describe_sync(report)
        )],
        ConvertEvent::ManifestFailed {
            manifest, reason, ..
        } => vec![format!(
            "    {}: not updated ({})",
            relative(manifest, root),
            reason
        )],
    }
}

/// Format the closing line of a bootstrap scan.
pub fn format_scan_summary(summary: &ScanSummary) -> Vec<String> {
    let mut parts = vec![format!("{} converted", summary.converted)];
    if summary.already_converted > 0 {
        parts.push(format!("{} already converted", summary.already_converted));
    }
    if summary.failed > 0 {
        parts.push(format!("{} failed", summary.failed));
    }
    if summary.manifest_failures > 0 {
        parts.push(format!(
            "{} not recorded in manifest",
            summary.manifest_failures
        ));
    }

    vec![
        String::new(),
        format!("Scanned {} files: {}", summary.total(), parts.join(", ")),
    ]
}

/// Print the scan summary to stdout.
pub fn print_scan_summary(summary: &ScanSummary) {
    for line in format_scan_summary(summary) {
        println!("{}", line);
    }
}
