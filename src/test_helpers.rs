//! Shared test utilities for the webp-watch test suite.
//!
//! Provides in-memory image fixtures and a watched-directory builder so the
//! pipeline, scanner and watcher tests start from the same layout:
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = setup_assets(EMPTY_MANIFEST);
//! write_image(tmp.path(), "hero.png", &png_bytes(8, 8));
//! ```

use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A manifest with an empty export block.
pub const EMPTY_MANIFEST: &str = "export const Img = {\n};\n";

fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    }))
}

/// Encoded bytes of a small PNG.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    gradient(width, height)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// Encoded bytes of a small JPEG.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    gradient(width, height)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
        .unwrap();
    bytes
}

/// Write `index.ts` into `dir` and return its path.
pub fn write_manifest(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("index.ts");
    std::fs::write(&path, contents).unwrap();
    path
}

/// Write a file (creating parent directories) and return its path.
pub fn write_image(dir: &Path, relative: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, bytes).unwrap();
    path
}

/// A temp directory holding `index.ts` with the given contents.
pub fn setup_assets(manifest: &str) -> TempDir {
    let tmp = TempDir::new().unwrap();
    write_manifest(tmp.path(), manifest);
    tmp
}

/// Current manifest text of a directory set up with [`setup_assets`].
pub fn read_manifest(dir: &Path) -> String {
    std::fs::read_to_string(dir.join("index.ts")).unwrap()
}
