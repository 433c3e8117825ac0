//! Manifest synchronization: keeping `index.ts` in step with converted assets.
//!
//! The manifest is a generated TypeScript module that imports every converted
//! asset and re-exports them through one aggregate object:
//!
//! ```text
//! import hero from "./hero.webp";
//! import logo from "./logo.webp";
//! export const Img = {
//!     hero,
//!     logo,
//! };
//! ```
//!
//! It is treated as line-oriented text, never parsed as TypeScript. Exactly two
//! patterns are recognized: an import line that mentions the asset's file name,
//! and the aggregate block that starts at the line containing the export marker
//! (`export const Img =` by default) and ends at the first following line that
//! contains `}`.
//!
//! # Algorithm
//!
//! [`sync_document`] walks the lines once, tracking which region it is in:
//!
//! ```text
//!   BeforeExport ──marker──▶ InsideExport ──line with `}`──▶ AfterExport
//!        ▲                        ▲                               │
//!        └─────── (start) ────────┴──────── marker again ─────────┘
//! ```
//!
//! - Any line naming the original or converted file by its path relative to
//!   the manifest counts as the existing import; the original path is
//!   rewritten to the converted one in place. Paths match whole, so
//!   `barfoo.png` and `icons/foo.png` never match `foo.png`.
//! - An import binding the member to some other file is a clash: the sync
//!   fails with [`ManifestError::DuplicateIdentifier`] instead of importing
//!   the same name twice.
//! - Inside the block, a line listing `member,` counts as the existing export.
//! - A later marker restarts the block: only the last block is ever targeted.
//!
//! After the pass, a missing export entry is inserted just before the closing
//! line (indented like its siblings) and a missing import is prepended at the
//! top. A block that is never closed is reported as
//! [`ManifestError::Malformed`] and nothing is written.
//!
//! The result is idempotent: a second sync with the same asset finds both the
//! import and the export entry and returns the document unchanged.
//!
//! # Concurrency
//!
//! The read-modify-write is not transactional. [`Manifest`] owns a mutex so
//! every sync against one manifest path is serialized within the process.

use crate::naming::{self, IdentifierPolicy};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Manifest not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Export block opened at line {line} is never closed")]
    Malformed { line: usize },
    #[error("`{name}` does not yield a valid identifier")]
    InvalidIdentifier { name: String },
    #[error("`{member}` is already imported from another file at line {line}")]
    DuplicateIdentifier { member: String, line: usize },
}

/// Textual conventions of the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Substring that identifies the opening line of the export aggregate.
    pub export_marker: String,
    /// Indentation for a new entry when the block has no siblings to copy.
    pub indent: String,
    pub identifiers: IdentifierPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            export_marker: "export const Img =".to_string(),
            indent: "    ".to_string(),
            identifiers: IdentifierPolicy::default(),
        }
    }
}

/// The names one asset is known by inside the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetNames {
    /// Base file name of the source image (`foo.png`).
    pub original_name: String,
    /// Base file name of the converted image (`foo.webp`).
    pub converted_name: String,
    /// Identifier bound by the import and listed in the export block.
    pub member: String,
    /// Import specifier relative to the manifest (`./foo.webp`).
    pub reference: String,
    /// The same specifier for the source image (`./foo.png`).
    pub original_reference: String,
}

impl AssetNames {
    pub fn new(
        manifest_dir: &Path,
        original: &Path,
        converted: &Path,
        policy: IdentifierPolicy,
    ) -> Result<Self, ManifestError> {
        let original_name = naming::file_name(original);
        let converted_name = naming::file_name(converted);
        let member = naming::member_identifier(&converted_name, policy).ok_or_else(|| {
            ManifestError::InvalidIdentifier {
                name: converted_name.clone(),
            }
        })?;
        Ok(Self {
            original_name,
            reference: naming::relative_reference(manifest_dir, converted),
            original_reference: naming::relative_reference(manifest_dir, original),
            converted_name,
            member,
        })
    }

    fn import_line(&self) -> String {
        format!("import {} from \"{}\";", self.member, self.reference)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportChange {
    /// A new import line was prepended.
    Added,
    /// An import of the original file was rewritten to the converted file.
    Migrated,
    Present,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportChange {
    /// A new entry was inserted before the closing line.
    Added,
    Present,
    /// The document has no export marker; only the import is maintained.
    NoAggregate,
}

/// What a sync did to the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub import: ImportChange,
    pub export: ExportChange,
    /// Whether the document text differs from its previous contents.
    pub changed: bool,
}

/// Output of [`sync_document`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synced {
    pub text: String,
    pub report: SyncReport,
}

/// Where the line pass currently is relative to the export aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    BeforeExport,
    InsideExport,
    AfterExport,
}

/// The aggregate block as seen so far.
#[derive(Debug)]
struct ExportBlock {
    start: usize,
    close: Option<usize>,
    indent: Option<String>,
    lists_member: bool,
}

impl ExportBlock {
    fn open(start: usize) -> Self {
        Self {
            start,
            close: None,
            indent: None,
            lists_member: false,
        }
    }
}

/// A manifest file on disk with serialized access.
#[derive(Debug)]
pub struct Manifest {
    path: PathBuf,
    options: SyncOptions,
    lock: Mutex<()>,
}

impl Manifest {
    pub fn new(path: impl Into<PathBuf>, options: SyncOptions) -> Self {
        Self {
            path: path.into(),
            options,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Record `converted` (the WebP counterpart of `original`) in the manifest.
    ///
    /// Holds the manifest lock for the whole read-modify-write.
    pub fn sync(&self, original: &Path, converted: &Path) -> Result<SyncReport, ManifestError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        sync_file(&self.path, original, converted, &self.options)
    }
}

/// Read the manifest at `manifest_path`, sync one asset into it and write it
/// back if anything changed.
///
/// Callers sharing a manifest should go through [`Manifest::sync`].
pub fn sync_file(
    manifest_path: &Path,
    original: &Path,
    converted: &Path,
    options: &SyncOptions,
) -> Result<SyncReport, ManifestError> {
    let text = match fs::read_to_string(manifest_path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ManifestError::NotFound(manifest_path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    let manifest_dir = manifest_path.parent().unwrap_or(Path::new(""));
    let names = AssetNames::new(manifest_dir, original, converted, options.identifiers)?;
    let synced = sync_document(&text, &names, options)?;

    if synced.report.changed {
        fs::write(manifest_path, &synced.text)?;
    }
    tracing::debug!(
        manifest = %manifest_path.display(),
        member = %names.member,
        import = ?synced.report.import,
        export = ?synced.report.export,
        "manifest synced"
    );
    Ok(synced.report)
}

/// Sync one asset into the manifest text. Pure: no I/O.
pub fn sync_document(
    text: &str,
    names: &AssetNames,
    options: &SyncOptions,
) -> Result<Synced, ManifestError> {
    let eol = line_ending(text);
    let marker = options.export_marker.as_str();

    let mut out: Vec<String> = Vec::new();
    let mut region = Region::BeforeExport;
    let mut block: Option<ExportBlock> = None;
    let mut found_import = false;
    let mut migrated = false;
    let mut clash: Option<usize> = None;
    let original_path = path_token(&names.original_reference);
    let converted_path = path_token(&names.reference);

    for (index, line) in text.split_inclusive('\n').enumerate() {
        let names_original = path_token_positions(line, original_path).next().is_some();
        if names_original || path_token_positions(line, converted_path).next().is_some() {
            found_import = true;
        } else if clash.is_none() && binds_member(line, &names.member) {
            clash = Some(index);
        }
        let emitted = if names_original {
            migrated = true;
            replace_path_token(line, original_path, converted_path)
        } else {
            line.to_string()
        };

        if let Some(pos) = line.find(marker) {
            let mut opened = ExportBlock::open(index);
            opened.lists_member = lists_member(line, &names.member);
            region = if line[pos + marker.len()..].contains('}') {
                opened.close = Some(index);
                Region::AfterExport
            } else {
                Region::InsideExport
            };
            block = Some(opened);
        } else if region == Region::InsideExport
            && let Some(current) = block.as_mut()
        {
            if lists_member(line, &names.member) {
                current.lists_member = true;
            }
            if line.contains('}') {
                current.close = Some(index);
                region = Region::AfterExport;
            } else if current.indent.is_none() && !line.trim().is_empty() {
                current.indent = Some(leading_whitespace(line).to_string());
            }
        }

        out.push(emitted);
    }

    if !found_import && let Some(index) = clash {
        return Err(ManifestError::DuplicateIdentifier {
            member: names.member.clone(),
            line: index + 1,
        });
    }

    // Export first: its indices refer to the unshifted lines.
    let export = match block {
        None => ExportChange::NoAggregate,
        Some(ExportBlock {
            lists_member: true, ..
        }) => ExportChange::Present,
        Some(ExportBlock {
            start,
            close: Some(close),
            indent,
            ..
        }) if close > start => {
            let indent = indent.unwrap_or_else(|| options.indent.clone());
            out.insert(close, format!("{indent}{},{eol}", names.member));
            ExportChange::Added
        }
        Some(ExportBlock { start, .. }) => {
            return Err(ManifestError::Malformed { line: start + 1 });
        }
    };

    let import = if !found_import {
        out.insert(0, format!("{}{eol}", names.import_line()));
        ImportChange::Added
    } else if migrated {
        ImportChange::Migrated
    } else {
        ImportChange::Present
    };

    let new_text = out.concat();
    let changed = new_text != text;
    Ok(Synced {
        text: new_text,
        report: SyncReport {
            import,
            export,
            changed,
        },
    })
}

/// `\r\n` if the first terminated line uses it, `\n` otherwise.
fn line_ending(text: &str) -> &'static str {
    match text.find('\n') {
        Some(i) if text[..i].ends_with('\r') => "\r\n",
        _ => "\n",
    }
}

fn leading_whitespace(line: &str) -> &str {
    let trimmed = line.trim_start_matches([' ', '\t']);
    &line[..line.len() - trimmed.len()]
}

fn is_file_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '@' | '+' | '$' | '~')
}

fn is_path_char(c: char) -> bool {
    is_file_name_char(c) || matches!(c, '/' | '\\')
}

/// `icons/foo.webp` for `./icons/foo.webp`.
fn path_token(reference: &str) -> &str {
    reference.strip_prefix("./").unwrap_or(reference)
}

/// Byte offsets where `path` occurs as a whole relative path, bare or
/// `./`-prefixed. `../foo.png` and `icons/foo.png` are not `foo.png`.
fn path_token_positions<'a>(line: &'a str, path: &'a str) -> impl Iterator<Item = usize> + 'a {
    line.match_indices(path)
        .map(|(i, _)| i)
        .filter(move |&i| {
            let before = &line[..i];
            let before = before.strip_suffix("./").unwrap_or(before);
            !path.is_empty()
                && !before.chars().next_back().is_some_and(is_path_char)
                && !line[i + path.len()..].chars().next().is_some_and(is_path_char)
        })
}

fn replace_path_token(line: &str, from: &str, to: &str) -> String {
    let mut out = String::with_capacity(line.len() + to.len());
    let mut last = 0;
    for i in path_token_positions(line, from) {
        out.push_str(&line[last..i]);
        out.push_str(to);
        last = i + from.len();
    }
    out.push_str(&line[last..]);
    out
}

/// True if the line is an import binding `member` as its default name.
fn binds_member(line: &str, member: &str) -> bool {
    let Some(rest) = line.trim_start().strip_prefix("import") else {
        return false;
    };
    if !rest.starts_with(char::is_whitespace) {
        return false;
    }
    rest.trim_start()
        .strip_prefix(member)
        .is_some_and(|after| !after.starts_with(naming::is_identifier_char))
}

/// True if the line lists `member` as an entry: the whole identifier
/// immediately followed by a comma.
fn lists_member(line: &str, member: &str) -> bool {
    line.match_indices(member).any(|(i, _)| {
        !member.is_empty()
            && !line[..i]
                .chars()
                .next_back()
                .is_some_and(naming::is_identifier_char)
            && line[i + member.len()..].starts_with(',')
    })
}
