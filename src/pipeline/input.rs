//! The uploaded file as the pipeline sees it.

use crate::imaging::{ImageBackend, ImageFormatKind, ImageMetadata, ImageSource};
use std::path::Path;
use std::sync::OnceLock;
use tracing::warn;

/// An uploaded file: bytes (path or stream), the declared name and mime type,
/// and metadata read lazily on first use.
///
/// Owned by one request; metadata is read at most once no matter how many
/// jobs ask for it.
#[derive(Debug)]
pub struct InputImage {
    pub source: ImageSource,
    /// Declared file name, extension included.
    pub name: String,
    /// Declared mime type, if the client sent one.
    pub mime: Option<String>,
    metadata: OnceLock<Option<ImageMetadata>>,
}

impl InputImage {
    pub fn new(source: ImageSource, name: impl Into<String>) -> Self {
        Self {
            source,
            name: name.into(),
            mime: None,
            metadata: OnceLock::new(),
        }
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    /// File name without its extension.
    pub fn stem(&self) -> &str {
        Path::new(&self.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.name)
    }

    /// Format implied by the declared extension.
    pub fn declared_format(&self) -> Option<ImageFormatKind> {
        ImageFormatKind::from_path(Path::new(&self.name))
    }

    /// A declared mime type outside `image/*` rules the file out up front.
    pub fn declared_non_image(&self) -> bool {
        self.mime
            .as_deref()
            .is_some_and(|m| !m.trim().to_ascii_lowercase().starts_with("image/"))
    }

    /// Metadata if it has already been read; never touches the codec.
    pub fn cached_metadata(&self) -> Option<ImageMetadata> {
        self.metadata.get().copied().flatten()
    }

    /// Dimensions, format and size; `None` if the codec cannot read them.
    pub fn metadata(&self, backend: &impl ImageBackend) -> Option<ImageMetadata> {
        *self
            .metadata
            .get_or_init(|| match backend.read_metadata(&self.source) {
                Ok(meta) => Some(meta),
                Err(e) => {
                    warn!(file = %self.name, "Could not read image metadata: {e}");
                    None
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};

    #[test]
    fn metadata_is_read_once() {
        let backend = MockBackend::new();
        let image = InputImage::new(ImageSource::path("/up/photo.jpg"), "photo.jpg");
        assert_eq!(image.metadata(&backend).unwrap().width, 2000);
        assert_eq!(image.metadata(&backend).unwrap().height, 1500);

        let reads = backend
            .get_operations()
            .into_iter()
            .filter(|op| matches!(op, RecordedOp::ReadMetadata(_)))
            .count();
        assert_eq!(reads, 1);
    }

    #[test]
    fn stem_and_declared_format() {
        let image = InputImage::new(ImageSource::path("/tmp/x"), "holiday.photo.JPG");
        assert_eq!(image.stem(), "holiday.photo");
        assert_eq!(image.declared_format(), Some(ImageFormatKind::Jpeg));
    }

    #[test]
    fn non_image_mime_is_flagged() {
        let source = ImageSource::path("/tmp/x");
        assert!(InputImage::new(source.clone(), "a.pdf")
            .with_mime("application/pdf")
            .declared_non_image());
        assert!(!InputImage::new(source.clone(), "a.png")
            .with_mime("image/png")
            .declared_non_image());
        assert!(!InputImage::new(source, "a.png").declared_non_image());
    }
}
