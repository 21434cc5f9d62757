//! Format decision: should this upload get a primary conversion, and to what?
//!
//! Checks run in a fixed order and the first failure wins:
//!
//! 1. sniff: not an image → `NotAnImage`
//! 2. full decode: corrupt → `FaultyImage`
//! 3. metadata: no dimensions or no format → `UnreadableMetadata`
//! 4. source format not enabled (or not JPEG/PNG/TIFF) → `SourceFormatDisabled`
//! 5. `convertTo = off` → `ConversionDisabled`
//!
//! Otherwise one full-resolution job targets the configured format. The
//! decision is a pure function of the bytes and the settings snapshot, so
//! repeating it gives the same answer.

use super::input::InputImage;
use super::job::{ConversionJob, Decision, JobKind, SkipReason};
use crate::imaging::{ImageBackend, ImageFormatKind};
use crate::settings::Settings;
use tracing::debug;

pub fn decide_primary_conversion(
    backend: &impl ImageBackend,
    image: &InputImage,
    settings: &Settings,
) -> Decision {
    let decision = probe(backend, image, settings);
    if let Decision::Skip(reason) = &decision {
        debug!(file = %image.name, "Skipping conversion: {reason}");
    }
    decision
}

fn probe(backend: &impl ImageBackend, image: &InputImage, settings: &Settings) -> Decision {
    if image.declared_non_image() {
        return Decision::Skip(SkipReason::NotAnImage);
    }
    match backend.identify(&image.source) {
        Ok(Some(_)) => {}
        Ok(None) => return Decision::Skip(SkipReason::NotAnImage),
        Err(e) => {
            debug!(file = %image.name, "Sniff failed: {e}");
            return Decision::Skip(SkipReason::NotAnImage);
        }
    }
    if let Err(e) = backend.verify(&image.source) {
        debug!(file = %image.name, "Decode check failed: {e}");
        return Decision::Skip(SkipReason::FaultyImage);
    }
    let Some(format) = image.metadata(backend).and_then(|m| m.format) else {
        return Decision::Skip(SkipReason::UnreadableMetadata);
    };
    match ImageFormatKind::from_image_format(format) {
        Some(kind) => decide_for_format(kind, settings),
        None => Decision::Skip(SkipReason::SourceFormatDisabled),
    }
}

/// Steps 4 and 5, for a format already known.
pub fn decide_for_format(format: ImageFormatKind, settings: &Settings) -> Decision {
    if !settings.converts_from(format) {
        return Decision::Skip(SkipReason::SourceFormatDisabled);
    }
    match settings.convert_to.target_format() {
        Some(target) => Decision::Convert(primary_job(target, settings)),
        None => Decision::Skip(SkipReason::ConversionDisabled),
    }
}

/// Full-resolution format switch. Never resized, so the AVIF no-resize rule
/// holds trivially. Orientation is always baked in because re-encoding
/// drops the EXIF tag that carried it.
fn primary_job(target: ImageFormatKind, settings: &Settings) -> ConversionJob {
    ConversionJob {
        kind: JobKind::Primary,
        target_format: Some(target),
        resize: None,
        encode: settings.encode_options(target),
        auto_orient: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::MockBackend;
    use crate::imaging::{AvifOptions, EncodeOptions, ImageMetadata, ImageSource, WebpOptions};
    use crate::settings::ConvertTo;
    use crate::test_helpers::settings;

    fn upload(name: &str) -> InputImage {
        InputImage::new(ImageSource::path(format!("/uploads/{name}")), name)
    }

    fn meta(format: image::ImageFormat) -> ImageMetadata {
        ImageMetadata {
            width: 2000,
            height: 1500,
            format: Some(format),
            byte_size: 400_000,
        }
    }

    #[test]
    fn jpeg_to_webp_with_defaults() {
        let backend = MockBackend::new();
        let decision = decide_primary_conversion(&backend, &upload("a.jpg"), &Settings::default());
        assert_eq!(
            decision,
            Decision::Convert(ConversionJob {
                kind: JobKind::Primary,
                target_format: Some(ImageFormatKind::Webp),
                resize: None,
                encode: EncodeOptions::Webp(WebpOptions {
                    quality: 100,
                    lossless: false
                }),
                auto_orient: true,
            })
        );
    }

    #[test]
    fn avif_target_uses_avif_quality_and_never_resizes() {
        let backend = MockBackend::new();
        let s = settings(|s| s.convert_to = ConvertTo::Avif);
        let Decision::Convert(job) = decide_primary_conversion(&backend, &upload("a.jpg"), &s)
        else {
            panic!("expected a conversion");
        };
        assert_eq!(job.encode, EncodeOptions::Avif(AvifOptions::default()));
        assert_eq!(job.resize, None);
    }

    #[test]
    fn not_an_image() {
        let backend = MockBackend::not_an_image();
        assert_eq!(
            decide_primary_conversion(&backend, &upload("notes.txt"), &Settings::default()),
            Decision::Skip(SkipReason::NotAnImage)
        );
    }

    #[test]
    fn declared_non_image_mime_skips_before_sniffing() {
        let backend = MockBackend::new();
        let image = upload("report.jpg").with_mime("application/pdf");
        assert_eq!(
            decide_primary_conversion(&backend, &image, &Settings::default()),
            Decision::Skip(SkipReason::NotAnImage)
        );
        assert!(backend.get_operations().is_empty());
    }

    #[test]
    fn faulty_image() {
        let backend = MockBackend::faulty();
        assert_eq!(
            decide_primary_conversion(&backend, &upload("broken.jpg"), &Settings::default()),
            Decision::Skip(SkipReason::FaultyImage)
        );
    }

    #[test]
    fn unreadable_metadata() {
        let mut backend = MockBackend::new();
        backend.metadata = None;
        assert_eq!(
            decide_primary_conversion(&backend, &upload("a.jpg"), &Settings::default()),
            Decision::Skip(SkipReason::UnreadableMetadata)
        );
    }

    #[test]
    fn png_disabled() {
        let backend = MockBackend::with_metadata(meta(image::ImageFormat::Png));
        let s = settings(|s| s.convert_from_png = false);
        assert_eq!(
            decide_primary_conversion(&backend, &upload("a.png"), &s),
            Decision::Skip(SkipReason::SourceFormatDisabled)
        );
    }

    #[test]
    fn non_source_formats_are_never_converted() {
        for format in [
            image::ImageFormat::WebP,
            image::ImageFormat::Avif,
            image::ImageFormat::Gif,
        ] {
            let backend = MockBackend::with_metadata(meta(format));
            assert_eq!(
                decide_primary_conversion(&backend, &upload("a.img"), &Settings::default()),
                Decision::Skip(SkipReason::SourceFormatDisabled),
                "{format:?}"
            );
        }
    }

    #[test]
    fn conversion_off() {
        let backend = MockBackend::new();
        let s = settings(|s| s.convert_to = ConvertTo::Off);
        assert_eq!(
            decide_primary_conversion(&backend, &upload("a.jpg"), &s),
            Decision::Skip(SkipReason::ConversionDisabled)
        );
    }

    #[test]
    fn source_flag_is_checked_before_target() {
        let s = settings(|s| {
            s.convert_to = ConvertTo::Off;
            s.convert_from_tiff = false;
        });
        assert_eq!(
            decide_for_format(ImageFormatKind::Tiff, &s),
            Decision::Skip(SkipReason::SourceFormatDisabled)
        );
    }

    #[test]
    fn deterministic_for_identical_inputs() {
        let backend = MockBackend::new();
        let s = settings(|s| s.convert_to = ConvertTo::Avif);
        let image = upload("a.jpg");
        let first = decide_primary_conversion(&backend, &image, &s);
        let second = decide_primary_conversion(&backend, &image, &s);
        assert_eq!(first, second);
    }
}
