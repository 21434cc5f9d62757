//! Planned work and its outcomes.

use crate::imaging::{EncodeOptions, ImageFormatKind, Resize};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Which artifact a job produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum JobKind {
    /// The format switch of the full-resolution image. Replaces the upload.
    Primary,
    /// A responsive variant, keyed `<breakpoint>_<format>` or `<breakpoint>`.
    Breakpoint { key: String, threshold: u32 },
}

/// A planned unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionJob {
    pub kind: JobKind,
    /// `None` keeps the original codec.
    pub target_format: Option<ImageFormatKind>,
    /// `None` means no resize.
    pub resize: Option<Resize>,
    pub encode: EncodeOptions,
    /// Bake the EXIF orientation into the pixels.
    pub auto_orient: bool,
}

/// Output key of the primary job. Breakpoint tables may not produce it.
pub const PRIMARY_KEY: &str = "primary";

impl ConversionJob {
    /// Output key; unique among the jobs planned for one image.
    pub fn key(&self) -> &str {
        match &self.kind {
            JobKind::Primary => PRIMARY_KEY,
            JobKind::Breakpoint { key, .. } => key,
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(self.kind, JobKind::Primary)
    }

    /// Format the artifact is written in.
    pub fn output_format(&self) -> ImageFormatKind {
        self.encode.format()
    }
}

/// Why a file is passed through unconverted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    NotAnImage,
    FaultyImage,
    UnreadableMetadata,
    SourceFormatDisabled,
    ConversionDisabled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::NotAnImage => "not an image",
            SkipReason::FaultyImage => "faulty image",
            SkipReason::UnreadableMetadata => "unreadable metadata",
            SkipReason::SourceFormatDisabled => "conversion from this format is disabled",
            SkipReason::ConversionDisabled => "conversion is disabled",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Convert(ConversionJob),
    Skip(SkipReason),
}

/// What the optimization post-pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PassOutcome {
    /// No post-pass configured.
    NotRun,
    /// The post-pass output was smaller and replaced the pre-pass bytes.
    Optimized { saved_bytes: u64 },
    /// The post-pass output was not smaller and was discarded.
    RegressionDetected,
    /// The post-pass itself failed; the pre-pass bytes stand.
    Failed,
}

/// The artifact one job wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionResult {
    pub key: String,
    pub path: PathBuf,
    pub format: ImageFormatKind,
    pub width: u32,
    pub height: u32,
    pub byte_size: u64,
    pub post_pass: PassOutcome,
    /// The output was no smaller than the source and was replaced by a copy
    /// of the source bytes.
    pub kept_original: bool,
}

impl ConversionResult {
    pub fn mime(&self) -> &'static str {
        self.format.mime()
    }
}

/// A job that failed at codec level. Siblings are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobFailure {
    pub key: String,
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::WebpOptions;

    fn job(kind: JobKind) -> ConversionJob {
        ConversionJob {
            kind,
            target_format: Some(ImageFormatKind::Webp),
            resize: None,
            encode: EncodeOptions::Webp(WebpOptions::default()),
            auto_orient: false,
        }
    }

    #[test]
    fn keys() {
        assert_eq!(job(JobKind::Primary).key(), "primary");
        let bp = job(JobKind::Breakpoint {
            key: "medium_webp".to_string(),
            threshold: 750,
        });
        assert_eq!(bp.key(), "medium_webp");
        assert!(!bp.is_primary());
        assert_eq!(bp.output_format(), ImageFormatKind::Webp);
    }

    #[test]
    fn skip_reasons_read_as_text() {
        assert_eq!(SkipReason::ConversionDisabled.to_string(), "conversion is disabled");
        assert_eq!(SkipReason::NotAnImage.to_string(), "not an image");
    }
}
