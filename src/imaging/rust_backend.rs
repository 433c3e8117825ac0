//! Pure Rust WebP transcoding, no system dependencies.
//!
//! | Step | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG) | `image::load_from_memory` (format sniffed from magic bytes) |
//! | Pixel layout | 16-bit and float images narrowed to 8-bit RGB(A) |
//! | Encode → WebP | `image::codecs::webp::WebPEncoder` (lossless) |

use super::backend::{BackendError, Transcoder};
use image::codecs::webp::WebPEncoder;
use image::{ColorType, DynamicImage, ImageFormat};
use std::sync::LazyLock;

/// Extensions whose decoders this crate knows how to map to a format.
///
/// Only those with a compiled-in decoder survive the `reading_enabled()`
/// filter below, so trimming the `image` features shrinks this list too.
const PHOTO_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    PHOTO_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
});

/// Returns the source extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// Lossless WebP transcoder backed by the `image` crate.
pub struct WebpTranscoder;

impl WebpTranscoder {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WebpTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

/// The WebP encoder only accepts 8-bit luma and RGB layouts, with or without
/// alpha. Anything wider is narrowed, keeping the alpha channel if present.
fn encodable(img: DynamicImage) -> DynamicImage {
    match img.color() {
        ColorType::L8 | ColorType::La8 | ColorType::Rgb8 | ColorType::Rgba8 => img,
        color if color.has_alpha() => DynamicImage::ImageRgba8(img.to_rgba8()),
        _ => DynamicImage::ImageRgb8(img.to_rgb8()),
    }
}

impl Transcoder for WebpTranscoder {
    fn encode(&self, source: &[u8]) -> Result<Vec<u8>, BackendError> {
        let img = image::load_from_memory(source)
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        let img = encodable(img);

        let mut out = Vec::new();
        img.write_with_encoder(WebPEncoder::new_lossless(&mut out))
            .map_err(|e| BackendError::Encode(e.to_string()))?;
        Ok(out)
    }
}
