//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the pipeline (which decides which artifacts to produce)
//! and the [`backend`](super::backend) (which does the actual pixel work).
//!
//! ## Types
//!
//! - [`Quality`]: lossy encoding quality (1–100). Clamped on construction.
//! - [`Resize`]: fit-inside bounding box; never upscales.
//! - [`JpegOptions`], [`PngOptions`], [`WebpOptions`], [`AvifOptions`]: the
//!   per-format knobs a user can tune from settings.
//! - [`EncodeOptions`]: one of the above, selected for a job's output format.
//! - [`TransformParams`]: everything one transform needs.

use super::format::ImageFormatKind;
use super::source::ImageSource;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }

    pub fn is_valid(value: u32) -> bool {
        (1..=100).contains(&value)
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(80)
    }
}

/// Aspect-preserving "fit within box" resize.
///
/// Both bounds are set to the breakpoint value; the output is bounded by the
/// smaller scaled dimension. Images already inside the box are left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Resize {
    pub width: u32,
    pub height: u32,
}

impl Resize {
    pub fn square(size: u32) -> Self {
        Self {
            width: size,
            height: size,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JpegOptions {
    pub quality: u32,
}

impl Default for JpegOptions {
    fn default() -> Self {
        Self { quality: 80 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PngOptions {
    /// zlib effort 0-9, mapped onto the encoder's fast/default/best presets.
    pub compression_level: u32,
    pub adaptive_filtering: bool,
}

impl Default for PngOptions {
    fn default() -> Self {
        Self {
            compression_level: 6,
            adaptive_filtering: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WebpOptions {
    pub quality: u32,
    pub lossless: bool,
}

impl Default for WebpOptions {
    fn default() -> Self {
        Self {
            quality: 100,
            lossless: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AvifOptions {
    pub quality: u32,
    /// CPU effort 0 (fastest) to 9 (slowest).
    pub effort: u32,
}

impl Default for AvifOptions {
    fn default() -> Self {
        Self {
            quality: 80,
            effort: 4,
        }
    }
}

impl AvifOptions {
    /// rav1e speed preset (1 = slowest, 10 = fastest) for this effort.
    pub fn encoder_speed(&self) -> u8 {
        (10 - self.effort.min(9)) as u8
    }
}

impl PngOptions {
    pub fn is_valid_compression_level(level: u32) -> bool {
        level <= 9
    }
}

impl AvifOptions {
    pub fn is_valid_effort(effort: u32) -> bool {
        effort <= 9
    }
}

/// Encoder settings for one output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum EncodeOptions {
    Jpeg(JpegOptions),
    Png(PngOptions),
    Webp(WebpOptions),
    Avif(AvifOptions),
    Tiff,
}

impl EncodeOptions {
    pub fn format(&self) -> ImageFormatKind {
        match self {
            EncodeOptions::Jpeg(_) => ImageFormatKind::Jpeg,
            EncodeOptions::Png(_) => ImageFormatKind::Png,
            EncodeOptions::Webp(_) => ImageFormatKind::Webp,
            EncodeOptions::Avif(_) => ImageFormatKind::Avif,
            EncodeOptions::Tiff => ImageFormatKind::Tiff,
        }
    }

    /// Quality knob for lossy formats, if the format has one.
    pub fn quality(&self) -> Option<Quality> {
        match self {
            EncodeOptions::Jpeg(o) => Some(Quality::new(o.quality)),
            EncodeOptions::Webp(o) if !o.lossless => Some(Quality::new(o.quality)),
            EncodeOptions::Avif(o) => Some(Quality::new(o.quality)),
            _ => None,
        }
    }
}

/// Everything one transform needs: read `source`, optionally resize,
/// re-encode with `encode`, write to `output`.
#[derive(Debug, Clone)]
pub struct TransformParams {
    pub source: ImageSource,
    pub output: PathBuf,
    pub resize: Option<Resize>,
    pub encode: EncodeOptions,
    /// Rotate/flip pixels according to the EXIF orientation tag.
    pub auto_orient: bool,
}
