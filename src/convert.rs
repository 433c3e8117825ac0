//! The conversion pipeline: one source image in, one WebP file and one
//! manifest update out.
//!
//! ## Per-path flow
//!
//! ```text
//! path ─▶ regular file? ──no──▶ ConvertError::NotAFile
//!           │
//!           ▼
//!       whitelisted extension? ──no──▶ Unsupported (silent)
//!           │
//!           ▼
//!       foo.webp exists? ──yes──▶ AlreadyConverted (nothing written)
//!           │
//!           ▼
//!       read ─▶ Transcoder::encode ─▶ write foo.webp ──error──▶ ConvertError::Failed
//!           │
//!           ▼
//!       Manifest::sync(foo.png, foo.webp) ──error──▶ logged, conversion still counts
//! ```
//!
//! The existence check is what makes the pipeline idempotent: duplicate
//! creation events and repeated scans find the WebP file and stop there.
//!
//! The first half ([`Pipeline::transcode`]) touches only the asset's own
//! files and is safe to run in parallel. The second half
//! ([`Pipeline::record`]) goes through the manifest lock. [`Pipeline::convert`]
//! runs both.
//!
//! ## Progress
//!
//! When a channel is attached with [`Pipeline::with_events`], every decision
//! is also sent as a [`ConvertEvent`] for the CLI printer
//! (see [`output::format_convert_event`](crate::output::format_convert_event)).

use crate::config::WatchConfig;
use crate::imaging::{BackendError, Transcoder};
use crate::manifest::{Manifest, ManifestError, SyncReport};
use crate::naming;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;

/// The watched directory cannot be served.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Watch directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),
    #[error("Manifest not found: {}", .0.display())]
    ManifestNotFound(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Not a regular file: {}", .0.display())]
    NotAFile(PathBuf),
    #[error("Unsupported extension: {}", .0.display())]
    Unsupported(PathBuf),
    #[error("No converted file for {}", .0.display())]
    NotConverted(PathBuf),
    #[error("Conversion failed for {}: {source}", path.display())]
    Failed {
        path: PathBuf,
        source: ConversionCause,
    },
    #[error("Manifest sync failed: {0}")]
    Manifest(#[from] ManifestError),
}

/// Why a conversion failed.
#[derive(Error, Debug)]
pub enum ConversionCause {
    #[error("reading source: {0}")]
    Read(io::Error),
    #[error(transparent)]
    Transcode(BackendError),
    #[error("writing output: {0}")]
    Write(io::Error),
}

/// Progress notifications for the CLI printer.
#[derive(Debug, Clone, PartialEq)]
pub enum ConvertEvent {
    Converted {
        source: PathBuf,
        output: PathBuf,
    },
    AlreadyConverted {
        source: PathBuf,
        output: PathBuf,
    },
    Failed {
        source: PathBuf,
        reason: String,
    },
    ManifestSynced {
        manifest: PathBuf,
        converted: PathBuf,
        report: SyncReport,
    },
    ManifestFailed {
        manifest: PathBuf,
        converted: PathBuf,
        reason: String,
    },
}

/// Result of the transcode half.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transcoded {
    Unsupported,
    AlreadyConverted { output: PathBuf },
    Written { output: PathBuf },
}

/// Result of a full conversion.
#[derive(Debug)]
pub enum ConvertOutcome {
    /// Extension not in the whitelist; nothing was done.
    Unsupported,
    /// The WebP counterpart already existed; nothing was written.
    AlreadyConverted { output: PathBuf },
    /// A new WebP file was written. The manifest result is carried along
    /// because a manifest failure does not undo the conversion.
    Converted {
        output: PathBuf,
        manifest: Result<SyncReport, ManifestError>,
    },
}

impl ConvertOutcome {
    /// True if this call wrote a new converted file.
    pub fn is_converted(&self) -> bool {
        matches!(self, ConvertOutcome::Converted { .. })
    }
}

/// Converts images found in one watched directory and records them in its
/// manifest.
pub struct Pipeline<T: Transcoder> {
    root: PathBuf,
    extensions: Vec<String>,
    transcoder: T,
    manifest: Manifest,
    events: Option<Sender<ConvertEvent>>,
}

impl<T: Transcoder> Pipeline<T> {
    /// Validate the watched directory and its manifest and build a pipeline.
    ///
    /// The directory is canonicalized so event paths, scan paths and the
    /// manifest location all share one absolute prefix.
    pub fn open(dir: &Path, config: &WatchConfig, transcoder: T) -> Result<Self, StartupError> {
        if !dir.is_dir() {
            return Err(StartupError::DirectoryNotFound(dir.to_path_buf()));
        }
        let root = dir.canonicalize()?;
        let manifest_path = root.join(&config.manifest.file);
        if !manifest_path.is_file() {
            return Err(StartupError::ManifestNotFound(manifest_path));
        }

        Ok(Self {
            root,
            extensions: config.convert.extensions.clone(),
            transcoder,
            manifest: Manifest::new(manifest_path, config.manifest.sync_options()),
            events: None,
        })
    }

    /// Send a [`ConvertEvent`] for every decision to `tx`.
    pub fn with_events(mut self, tx: Sender<ConvertEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Convert one path and record it in the manifest.
    pub fn convert(&self, path: &Path) -> Result<ConvertOutcome, ConvertError> {
        match self.transcode(path)? {
            Transcoded::Unsupported => Ok(ConvertOutcome::Unsupported),
            Transcoded::AlreadyConverted { output } => {
                Ok(ConvertOutcome::AlreadyConverted { output })
            }
            Transcoded::Written { output } => {
                let manifest = self.record(path, &output);
                Ok(ConvertOutcome::Converted { output, manifest })
            }
        }
    }

    /// Write the WebP counterpart of `path` unless it exists already.
    ///
    /// Does not touch the manifest.
    pub fn transcode(&self, path: &Path) -> Result<Transcoded, ConvertError> {
        if !path.is_file() {
            tracing::warn!(path = %path.display(), "not a regular file, skipping");
            return Err(ConvertError::NotAFile(path.to_path_buf()));
        }
        if !naming::has_extension(path, &self.extensions) {
            tracing::debug!(path = %path.display(), "unsupported extension");
            return Ok(Transcoded::Unsupported);
        }

        let output = naming::converted_path(path);
        if output.exists() {
            tracing::info!(path = %path.display(), "already converted");
            self.emit(ConvertEvent::AlreadyConverted {
                source: path.to_path_buf(),
                output: output.clone(),
            });
            return Ok(Transcoded::AlreadyConverted { output });
        }

        match self.write_converted(path, &output) {
            Ok(()) => {
                tracing::info!(path = %path.display(), output = %output.display(), "converted");
                self.emit(ConvertEvent::Converted {
                    source: path.to_path_buf(),
                    output: output.clone(),
                });
                Ok(Transcoded::Written { output })
            }
            Err(cause) => {
                tracing::error!(path = %path.display(), error = %cause, "conversion failed");
                self.emit(ConvertEvent::Failed {
                    source: path.to_path_buf(),
                    reason: cause.to_string(),
                });
                Err(ConvertError::Failed {
                    path: path.to_path_buf(),
                    source: cause,
                })
            }
        }
    }

    fn write_converted(&self, path: &Path, output: &Path) -> Result<(), ConversionCause> {
        let source = fs::read(path).map_err(ConversionCause::Read)?;
        let encoded = self
            .transcoder
            .encode(&source)
            .map_err(ConversionCause::Transcode)?;
        if let Err(e) = fs::write(output, &encoded) {
            // A partial file would be mistaken for a finished conversion.
            fs::remove_file(output).ok();
            return Err(ConversionCause::Write(e));
        }
        Ok(())
    }

    /// Record an existing conversion in the manifest.
    ///
    /// Failures are logged and reported, never escalated: the converted file
    /// stays on disk without a manifest entry.
    pub fn record(&self, original: &Path, converted: &Path) -> Result<SyncReport, ManifestError> {
        let result = self.manifest.sync(original, converted);
        match &result {
            Ok(report) => self.emit(ConvertEvent::ManifestSynced {
                manifest: self.manifest.path().to_path_buf(),
                converted: converted.to_path_buf(),
                report: *report,
            }),
            Err(e) => {
                tracing::warn!(
                    manifest = %self.manifest.path().display(),
                    converted = %converted.display(),
                    error = %e,
                    "converted file has no manifest entry"
                );
                self.emit(ConvertEvent::ManifestFailed {
                    manifest: self.manifest.path().to_path_buf(),
                    converted: converted.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        }
        result
    }

    /// Re-run the manifest sync for an image that was already converted.
    ///
    /// Repairs assets left without an entry after a manifest failure.
    pub fn resync(&self, path: &Path) -> Result<SyncReport, ConvertError> {
        if !naming::has_extension(path, &self.extensions) {
            return Err(ConvertError::Unsupported(path.to_path_buf()));
        }
        let output = naming::converted_path(path);
        if !output.is_file() {
            return Err(ConvertError::NotConverted(path.to_path_buf()));
        }
        Ok(self.record(path, &output)?)
    }

    fn emit(&self, event: ConvertEvent) {
        if let Some(tx) = &self.events {
            tx.send(event).ok();
        }
    }
}
