//! The output codecs the pipeline knows how to write.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// An image format the codec backend can encode.
///
/// Serialized lowercase (`"jpeg"`, `"webp"`, ...), matching the names used in
/// settings payloads and breakpoint tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormatKind {
    Jpeg,
    Png,
    Webp,
    Avif,
    Tiff,
}

impl ImageFormatKind {
    pub const ALL: [ImageFormatKind; 5] = [
        ImageFormatKind::Jpeg,
        ImageFormatKind::Png,
        ImageFormatKind::Webp,
        ImageFormatKind::Avif,
        ImageFormatKind::Tiff,
    ];

    /// Canonical name, also used as the file extension (without the dot).
    pub fn name(self) -> &'static str {
        match self {
            ImageFormatKind::Jpeg => "jpeg",
            ImageFormatKind::Png => "png",
            ImageFormatKind::Webp => "webp",
            ImageFormatKind::Avif => "avif",
            ImageFormatKind::Tiff => "tiff",
        }
    }

    /// Extension including the leading dot, e.g. `.webp`.
    pub fn dotted_ext(self) -> String {
        format!(".{}", self.name())
    }

    pub fn mime(self) -> &'static str {
        match self {
            ImageFormatKind::Jpeg => "image/jpeg",
            ImageFormatKind::Png => "image/png",
            ImageFormatKind::Webp => "image/webp",
            ImageFormatKind::Avif => "image/avif",
            ImageFormatKind::Tiff => "image/tiff",
        }
    }

    /// Formats an upload may be converted *from*. Each has its own enable flag.
    pub fn is_source_format(self) -> bool {
        matches!(
            self,
            ImageFormatKind::Jpeg | ImageFormatKind::Png | ImageFormatKind::Tiff
        )
    }

    pub fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Jpeg => Some(ImageFormatKind::Jpeg),
            image::ImageFormat::Png => Some(ImageFormatKind::Png),
            image::ImageFormat::WebP => Some(ImageFormatKind::Webp),
            image::ImageFormat::Avif => Some(ImageFormatKind::Avif),
            image::ImageFormat::Tiff => Some(ImageFormatKind::Tiff),
            _ => None,
        }
    }

    pub fn to_image_format(self) -> image::ImageFormat {
        match self {
            ImageFormatKind::Jpeg => image::ImageFormat::Jpeg,
            ImageFormatKind::Png => image::ImageFormat::Png,
            ImageFormatKind::Webp => image::ImageFormat::WebP,
            ImageFormatKind::Avif => image::ImageFormat::Avif,
            ImageFormatKind::Tiff => image::ImageFormat::Tiff,
        }
    }

    /// Map a file extension (`jpg`, `.TIF`, ...) to a format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(ImageFormatKind::Jpeg),
            "png" => Some(ImageFormatKind::Png),
            "webp" => Some(ImageFormatKind::Webp),
            "avif" => Some(ImageFormatKind::Avif),
            "tif" | "tiff" => Some(ImageFormatKind::Tiff),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

impl fmt::Display for ImageFormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_jpeg_png_tiff_are_source_formats() {
        let sources: Vec<_> = ImageFormatKind::ALL
            .into_iter()
            .filter(|f| f.is_source_format())
            .collect();
        assert_eq!(
            sources,
            vec![
                ImageFormatKind::Jpeg,
                ImageFormatKind::Png,
                ImageFormatKind::Tiff
            ]
        );
    }

    #[test]
    fn extension_aliases() {
        assert_eq!(
            ImageFormatKind::from_extension("JPG"),
            Some(ImageFormatKind::Jpeg)
        );
        assert_eq!(
            ImageFormatKind::from_extension(".tif"),
            Some(ImageFormatKind::Tiff)
        );
        assert_eq!(ImageFormatKind::from_extension("gif"), None);
    }

    #[test]
    fn image_format_mapping_is_symmetric() {
        for kind in ImageFormatKind::ALL {
            assert_eq!(
                ImageFormatKind::from_image_format(kind.to_image_format()),
                Some(kind)
            );
        }
        assert_eq!(
            ImageFormatKind::from_image_format(image::ImageFormat::Gif),
            None
        );
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&ImageFormatKind::Webp).unwrap();
        assert_eq!(json, "\"webp\"");
        let parsed: ImageFormatKind = serde_json::from_str("\"avif\"").unwrap();
        assert_eq!(parsed, ImageFormatKind::Avif);
    }

    #[test]
    fn mime_and_dotted_ext() {
        assert_eq!(ImageFormatKind::Webp.mime(), "image/webp");
        assert_eq!(ImageFormatKind::Avif.dotted_ext(), ".avif");
    }
}
