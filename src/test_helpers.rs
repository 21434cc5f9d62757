//! Shared test utilities for the img-convert test suite.
//!
//! Provides synthetic image fixtures (encoded with the `image` crate so no
//! binary files live in the repo) and settings builders.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! let path = tmp.path().join("photo.jpg");
//! create_test_jpeg(&path, 200, 150);
//!
//! let store = store_with(settings(|s| s.convert_to = ConvertTo::Avif));
//! ```

use image::{DynamicImage, ImageEncoder, RgbImage, RgbaImage};
use std::path::Path;
use std::sync::Arc;

use crate::settings::{Settings, SettingsService};
use crate::store::MemoryStore;

// =========================================================================
// Image fixtures
// =========================================================================

/// Gradient RGB pixels; compresses to something larger than a flat fill.
fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    })
}

/// Write a baseline JPEG.
pub fn create_test_jpeg(path: &Path, width: u32, height: u32) {
    let img = gradient(width, height);
    let file = std::fs::File::create(path).unwrap();
    let writer = std::io::BufWriter::new(file);
    image::codecs::jpeg::JpegEncoder::new(writer)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
}

/// Write an RGBA PNG with a translucent alpha ramp.
pub fn create_test_png(path: &Path, width: u32, height: u32) {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([(x % 256) as u8, (y % 256) as u8, 64, (x % 200) as u8 + 55])
    });
    DynamicImage::ImageRgba8(img)
        .save_with_format(path, image::ImageFormat::Png)
        .unwrap();
}

/// Write an 8-bit RGB TIFF.
pub fn create_test_tiff(path: &Path, width: u32, height: u32) {
    DynamicImage::ImageRgb8(gradient(width, height))
        .save_with_format(path, image::ImageFormat::Tiff)
        .unwrap();
}

// =========================================================================
// Settings fixtures
// =========================================================================

/// Default settings with `edit` applied.
pub fn settings(edit: impl FnOnce(&mut Settings)) -> Settings {
    let mut s = Settings::default();
    edit(&mut s);
    s
}

/// A settings service over an in-memory store seeded with `settings`.
pub fn store_with(settings: Settings) -> SettingsService {
    let service = SettingsService::new(Arc::new(MemoryStore::new()));
    service.update(&settings).unwrap();
    service
}
