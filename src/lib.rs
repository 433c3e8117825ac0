//! # webp-watch
//!
//! Watches an asset directory, converts every new PNG or JPEG into a sibling
//! WebP file, and keeps a TypeScript manifest in that directory in step:
//! one `import` line per converted asset and one entry in the manifest's
//! exported object literal.
//!
//! # Architecture: Event → Convert → Record
//!
//! ```text
//! 1. Watch     notify events  →  settled paths      (watch, once files stop changing)
//! 2. Convert   foo.png        →  foo.webp           (convert + imaging, skipped if foo.webp exists)
//! 3. Record    foo.webp       →  index.ts           (manifest, import + export entry)
//! ```
//!
//! At startup a bootstrap scan ([`scan`]) runs steps 2 and 3 over everything
//! already in the directory, so the watcher only has to care about what
//! arrives later.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`watch`] | notify-based change source with a settle tracker; blocks until shutdown |
//! | [`convert`] | The per-path pipeline: filter, skip-on-exists, transcode, record |
//! | [`scan`] | Bootstrap scan: parallel transcodes, serial manifest updates |
//! | [`manifest`] | Line-based manifest synchronization (imports and the export block) |
//! | [`imaging`] | The [`Transcoder`](imaging::Transcoder) trait and the pure-Rust WebP encoder |
//! | [`naming`] | Converted paths, member identifiers and import references |
//! | [`config`] | `webp-watch.toml` loading, merging over stock defaults, validation |
//! | [`output`] | CLI output formatting for pipeline events and scan summaries |
//!
//! # Design Decisions
//!
//! ## The converted file is the state
//!
//! There is no database and no record of what has been processed. A source
//! image counts as done exactly when its `.webp` sibling exists. Restarts,
//! duplicate events and repeated scans therefore converge on the same result,
//! and deleting a `.webp` file is how an operator asks for a re-conversion.
//!
//! ## Line-oriented manifest edits
//!
//! The manifest is never parsed as TypeScript. [`manifest::sync_document`]
//! walks its lines once, tracking whether it is before, inside or after the
//! export block, and splices in at most two lines. Everything it does not
//! recognize is left byte-for-byte intact, including line endings.
//!
//! ## Pure-Rust imaging
//!
//! Decoding and lossless WebP encoding both come from the `image` crate, so
//! the binary has no system dependencies.

pub mod config;
pub mod convert;
pub mod imaging;
pub mod manifest;
pub mod naming;
pub mod output;
pub mod scan;
pub mod watch;

#[cfg(test)]
pub(crate) mod test_helpers;
