//! Transcoder trait and shared error type.
//!
//! The [`Transcoder`] trait is the one operation the conversion pipeline needs
//! from an image backend: turn the bytes of a source image into the bytes of
//! its WebP counterpart. It is a pure function of its input, so the pipeline
//! owns every filesystem decision (where to read, where to write, whether to
//! skip).
//!
//! The production implementation is
//! [`WebpTranscoder`](super::rust_backend::WebpTranscoder), pure Rust and
//! statically linked.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Encode failed: {0}")]
    Encode(String),
}

/// Converts one encoded source image into the target format.
///
/// `Sync` so a single transcoder can be shared across rayon workers during the
/// bootstrap scan.
pub trait Transcoder: Sync {
    fn encode(&self, source: &[u8]) -> Result<Vec<u8>, BackendError>;
}
