//! Asset naming: which files are eligible for conversion, where their WebP
//! counterpart lands, and which identifier binds it in the manifest.
//!
//! Every name the rest of the crate uses is derived here so the pipeline, the
//! scanner and the manifest synchronizer agree on it:
//!
//! ```text
//! assets/icons/hero-banner.PNG
//!   extension        PNG              (matched case-insensitively)
//!   converted path   assets/icons/hero-banner.webp
//!   converted name   hero-banner.webp
//!   reference        ./icons/hero-banner.webp   (relative to index.ts in assets/)
//!   member           hero_banner      (sanitize policy)
//! ```
//!
//! ## Identifiers
//!
//! The member identifier is the converted file's stem. TypeScript only
//! accepts `[A-Za-z_$][A-Za-z0-9_$]*` (ASCII subset) that is not a reserved
//! word, so stems like `2x-logo` or `class` need a decision:
//! [`IdentifierPolicy::Sanitize`] rewrites them (`_2x_logo`, `_class`),
//! [`IdentifierPolicy::Reject`] refuses them.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Extension of every converted asset.
pub const TARGET_EXTENSION: &str = "webp";

/// Words that cannot be used as a binding name in an ES module.
const RESERVED_WORDS: &[&str] = &[
    "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
    "delete", "do", "else", "enum", "export", "extends", "false", "finally", "for", "function",
    "if", "implements", "import", "in", "instanceof", "interface", "let", "new", "null",
    "package", "private", "protected", "public", "return", "static", "super", "switch", "this",
    "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield",
];

/// What to do with a file stem that is not a valid identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierPolicy {
    /// Rewrite invalid characters to `_` and prefix `_` where needed.
    #[default]
    Sanitize,
    /// Refuse to add the asset to the manifest.
    Reject,
}

/// True if `path` has one of `extensions` (compared case-insensitively,
/// without the leading dot).
pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

/// The WebP path for a source image: same directory, same stem.
pub fn converted_path(path: &Path) -> PathBuf {
    path.with_extension(TARGET_EXTENSION)
}

/// Base filename of a path as a string, lossily converted.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Derive the manifest identifier for a converted file name.
///
/// Returns `None` only under [`IdentifierPolicy::Reject`] when the stem is
/// not already a valid identifier.
pub fn member_identifier(converted_name: &str, policy: IdentifierPolicy) -> Option<String> {
    let stem = Path::new(converted_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    if is_identifier(&stem) {
        return Some(stem);
    }
    match policy {
        IdentifierPolicy::Sanitize => Some(sanitize_identifier(&stem)),
        IdentifierPolicy::Reject => None,
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

pub(crate) fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// True if `name` can be used as-is as a binding name.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if is_identifier_start(first) => {}
        _ => return false,
    }
    chars.all(is_identifier_char) && !RESERVED_WORDS.contains(&name)
}

/// Rewrite an arbitrary stem into a valid identifier.
///
/// - `hero-banner` → `hero_banner`
/// - `2x-logo` → `_2x_logo`
/// - `class` → `_class`
/// - `` → `_`
pub fn sanitize_identifier(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if is_identifier_char(c) { c } else { '_' })
        .collect();

    let needs_prefix = match out.chars().next() {
        None => true,
        Some(first) => !is_identifier_start(first) || RESERVED_WORDS.contains(&out.as_str()),
    };
    if needs_prefix {
        out.insert(0, '_');
    }
    out
}

/// Import specifier for `target` as seen from a module in `base_dir`.
///
/// Always `./`-prefixed with `/` separators. Falls back to `./<file name>`
/// when `target` is not below `base_dir`.
pub fn relative_reference(base_dir: &Path, target: &Path) -> String {
    let parts: Option<Vec<String>> = target.strip_prefix(base_dir).ok().map(|rel| {
        rel.components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect()
    });

    match parts {
        Some(parts) if !parts.is_empty() => format!("./{}", parts.join("/")),
        _ => format!("./{}", file_name(target)),
    }
}
