//! Image transcoding: source bytes in, WebP bytes out.
//!
//! The module is split into:
//! - **Backend**: the [`Transcoder`] trait and [`BackendError`]
//! - **Rust backend**: [`WebpTranscoder`], decoding with the `image` crate and
//!   encoding lossless WebP

pub mod backend;
pub mod rust_backend;

pub use backend::{BackendError, Transcoder};
pub use rust_backend::{WebpTranscoder, supported_input_extensions};
