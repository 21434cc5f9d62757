//! Codec backend trait and shared types.
//!
//! The [`ImageBackend`] trait is the whole surface the pipeline needs from a
//! codec engine: sniff, verify, read metadata, and transform. The pipeline
//! never touches pixels itself.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend).

use super::format::ImageFormatKind;
use super::params::TransformParams;
use super::source::ImageSource;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unrecognized image data")]
    Unrecognized,
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Encode failed: {0}")]
    Encode(String),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Result of a metadata read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    /// Container format as detected from the bytes, if recognizable.
    pub format: Option<image::ImageFormat>,
    /// Encoded size of the payload.
    pub byte_size: u64,
}

impl ImageMetadata {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// The detected format, if it is one the pipeline can write.
    pub fn format_kind(&self) -> Option<ImageFormatKind> {
        self.format.and_then(ImageFormatKind::from_image_format)
    }
}

/// What a transform wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformOutput {
    pub width: u32,
    pub height: u32,
    pub byte_size: u64,
    pub format: ImageFormatKind,
}

/// Trait for codec backends.
///
/// Implementations must be `Sync`: one backend is shared by every job of a
/// request, and jobs run on rayon's pool.
pub trait ImageBackend: Sync {
    /// Sniff the leading bytes. `None` means the payload is not an image.
    fn identify(&self, source: &ImageSource) -> Result<Option<image::ImageFormat>, BackendError>;

    /// Fully decode the payload; an error means the image is corrupt.
    fn verify(&self, source: &ImageSource) -> Result<(), BackendError>;

    /// Read dimensions, format and encoded size.
    fn read_metadata(&self, source: &ImageSource) -> Result<ImageMetadata, BackendError>;

    /// Decode, optionally resize, re-encode and write to `params.output`.
    fn transform(&self, params: &TransformParams) -> Result<TransformOutput, BackendError>;
}
