//! Image processing: pure Rust codecs behind a small trait.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Sniff** | `image::guess_format` |
//! | **Verify / metadata** | `image` decoders, `avif-parse` for AVIF containers |
//! | **Decode AVIF** | `avif-parse` + `rav1d` |
//! | **Resize** | Lanczos3, fit-inside box |
//! | **Encode** | `image` (JPEG, PNG, TIFF, AVIF), `webp` (WebP) |
//!
//! The module is split into:
//! - **Format**: the closed set of formats the pipeline reads and writes
//! - **Source**: path- or stream-backed upload bytes
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]

pub mod backend;
mod calculations;
pub mod format;
pub mod params;
pub mod rust_backend;
pub mod source;

pub use backend::{BackendError, ImageBackend, ImageMetadata, TransformOutput};
pub use calculations::{breakpoint_smaller_than, fit_inside};
pub use format::ImageFormatKind;
pub use params::{
    AvifOptions, EncodeOptions, JpegOptions, PngOptions, Quality, Resize, TransformParams,
    WebpOptions,
};
pub use rust_backend::RustBackend;
pub use source::ImageSource;
