//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Convert
//!
//! ```text
//! 001 photo.jpg → photo.webp (2000x1500, 412.35 kB)
//!     large_jpeg: 1000x750, 98.10 kB
//!     large_webp: 1000x750, 80.12 kB
//!     medium_jpeg: failed: Codec failure: ...
//! 002 notes.txt
//!     passed through: not an image
//!
//! Converted 1 of 2 files, 2 variants, 1 error
//! ```
//!
//! ## Plan
//!
//! ```text
//! photo.jpg (2000x1500 jpeg, 412.35 kB)
//!     primary: webp, full size, quality 100
//!     large_webp: webp, fit 1000x1000, quality 100
//!     large_avif: avif, full size, quality 80
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure and do no I/O.

use crate::imaging::ImageMetadata;
use crate::pipeline::ConversionJob;
use crate::settings::Settings;
use crate::upload::{ArtifactDescriptor, Plan, ProcessedUpload, UploadOutcome, kilobytes};

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn on_off(flag: bool) -> &'static str {
    if flag { "on" } else { "off" }
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

/// `1000x750, 80.12 kB`
fn artifact_detail(artifact: &ArtifactDescriptor) -> String {
    match (artifact.width, artifact.height) {
        (Some(w), Some(h)) => format!("{w}x{h}, {:.2} kB", artifact.size),
        _ => format!("{:.2} kB", artifact.size),
    }
}

// ============================================================================
// Convert
// ============================================================================

/// Lines for one processed upload.
pub fn format_upload(index: usize, input_name: &str, upload: &ProcessedUpload) -> Vec<String> {
    let mut lines = Vec::new();
    let header = format!("{} {}", format_index(index), input_name);
    match upload.outcome {
        UploadOutcome::Converted => lines.push(format!(
            "{header} → {} ({})",
            upload.file.name,
            artifact_detail(&upload.file)
        )),
        UploadOutcome::PassedThrough(reason) => {
            lines.push(header);
            lines.push(format!("{}passed through: {reason}", indent(1)));
        }
        UploadOutcome::PrimaryFailed => {
            lines.push(header);
            lines.push(format!("{}kept original: conversion failed", indent(1)));
        }
        UploadOutcome::Cancelled => {
            lines.push(header);
            lines.push(format!("{}cancelled", indent(1)));
        }
    }
    for (key, artifact) in &upload.formats {
        lines.push(format!("{}{key}: {}", indent(1), artifact_detail(artifact)));
    }
    for failure in &upload.errors {
        lines.push(format!("{}{}: failed: {}", indent(1), failure.key, failure.error));
    }
    lines
}

/// `Converted 1 of 2 files, 6 variants, 1 error`
pub fn format_convert_summary(uploads: &[ProcessedUpload]) -> String {
    let converted = uploads
        .iter()
        .filter(|u| u.outcome == UploadOutcome::Converted)
        .count();
    let variants: usize = uploads.iter().map(|u| u.formats.len()).sum();
    let errors: usize = uploads.iter().map(|u| u.errors.len()).sum();
    let mut summary = format!(
        "Converted {converted} of {}, {}",
        plural(uploads.len(), "file"),
        plural(variants, "variant")
    );
    if errors > 0 {
        summary.push_str(&format!(", {}", plural(errors, "error")));
    }
    summary
}

pub fn format_convert_output(inputs: &[String], uploads: &[ProcessedUpload]) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, (name, upload)) in inputs.iter().zip(uploads).enumerate() {
        lines.extend(format_upload(i + 1, name, upload));
    }
    lines.push(String::new());
    lines.push(format_convert_summary(uploads));
    lines
}

pub fn print_convert_output(inputs: &[String], uploads: &[ProcessedUpload]) {
    for line in format_convert_output(inputs, uploads) {
        println!("{}", line);
    }
}

// ============================================================================
// Plan
// ============================================================================

fn job_line(job: &ConversionJob) -> String {
    let size = match job.resize {
        Some(r) => format!("fit {}x{}", r.width, r.height),
        None => "full size".to_string(),
    };
    let mut line = format!("{}{}: {}, {size}", indent(1), job.key(), job.output_format());
    if let Some(q) = job.encode.quality() {
        line.push_str(&format!(", quality {}", q.value()));
    }
    if job.auto_orient {
        line.push_str(", auto-orient");
    }
    line
}

pub fn format_plan(name: &str, meta: Option<&ImageMetadata>, plan: &Plan) -> Vec<String> {
    let header = match meta {
        Some(m) => {
            let format = m
                .format_kind()
                .map(|f| f.to_string())
                .or_else(|| m.format.map(|f| format!("{f:?}").to_lowercase()))
                .unwrap_or_else(|| "unknown".to_string());
            format!(
                "{name} ({}x{} {format}, {:.2} kB)",
                m.width,
                m.height,
                kilobytes(m.byte_size)
            )
        }
        None => name.to_string(),
    };
    let mut lines = vec![header];
    match plan {
        Plan::Skip(reason) => lines.push(format!("{}skip: {reason}", indent(1))),
        Plan::Convert {
            primary,
            breakpoints,
        } => {
            lines.push(job_line(primary));
            lines.extend(breakpoints.iter().map(job_line));
        }
    }
    lines
}

pub fn print_plan(name: &str, meta: Option<&ImageMetadata>, plan: &Plan) {
    for line in format_plan(name, meta, plan) {
        println!("{}", line);
    }
}

// ============================================================================
// Settings
// ============================================================================

pub fn format_settings(settings: &Settings) -> Vec<String> {
    let from: Vec<&str> = [
        (settings.convert_from_jpeg, "JPEG"),
        (settings.convert_from_png, "PNG"),
        (settings.convert_from_tiff, "TIFF"),
    ]
    .into_iter()
    .filter_map(|(on, name)| on.then_some(name))
    .collect();
    let fo = &settings.format_options;

    vec![
        format!("Convert to: {}", target_name(settings)),
        format!(
            "Convert from: {}",
            if from.is_empty() {
                "none".to_string()
            } else {
                from.join(", ")
            }
        ),
        format!("Size optimization: {}", on_off(settings.size_optimization)),
        format!(
            "Responsive dimensions: {}",
            on_off(settings.responsive_dimensions)
        ),
        format!("Auto orientation: {}", on_off(settings.auto_orientation)),
        "Format options".to_string(),
        format!("{}jpeg: quality {}", indent(1), fo.jpeg.quality),
        format!(
            "{}png: compression level {}, adaptive filtering {}",
            indent(1),
            fo.png.compression_level,
            on_off(fo.png.adaptive_filtering)
        ),
        format!(
            "{}webp: quality {}, lossless {}",
            indent(1),
            fo.webp.quality,
            on_off(fo.webp.lossless)
        ),
        format!(
            "{}avif: quality {}, effort {}",
            indent(1),
            fo.avif.quality,
            fo.avif.effort
        ),
    ]
}

fn target_name(settings: &Settings) -> &'static str {
    match settings.convert_to.target_format() {
        Some(f) => f.name(),
        None => "off",
    }
}

pub fn print_settings(settings: &Settings) {
    for line in format_settings(settings) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::{EncodeOptions, ImageFormatKind, Resize, WebpOptions};
    use crate::pipeline::{JobFailure, JobKind, SkipReason};
    use crate::settings::ConvertTo;
    use crate::upload::FileInfo;
    use std::collections::BTreeMap;

    fn descriptor(name: &str, dims: Option<(u32, u32)>, bytes: u64) -> ArtifactDescriptor {
        ArtifactDescriptor {
            name: name.to_string(),
            hash: "h".to_string(),
            ext: ".webp".to_string(),
            mime: "image/webp".to_string(),
            path: None,
            width: dims.map(|d| d.0),
            height: dims.map(|d| d.1),
            size_in_bytes: bytes,
            size: kilobytes(bytes),
        }
    }

    fn processed(outcome: UploadOutcome) -> ProcessedUpload {
        ProcessedUpload {
            file: descriptor("photo.webp", Some((2000, 1500)), 412_350),
            file_info: FileInfo::default(),
            formats: BTreeMap::new(),
            outcome,
            errors: Vec::new(),
        }
    }

    #[test]
    fn format_index_is_zero_padded() {
        assert_eq!(format_index(1), "001");
        assert_eq!(format_index(42), "042");
        assert_eq!(format_index(123), "123");
    }

    #[test]
    fn indent_levels() {
        assert_eq!(indent(0), "");
        assert_eq!(indent(2), "        ");
    }

    #[test]
    fn converted_upload_lists_variants_and_failures() {
        let mut upload = processed(UploadOutcome::Converted);
        upload.formats.insert(
            "large_webp".to_string(),
            descriptor("large_webp_photo.webp", Some((1000, 750)), 80_120),
        );
        upload.errors.push(JobFailure {
            key: "medium_jpeg".to_string(),
            error: "Codec failure: boom".to_string(),
        });

        let lines = format_upload(1, "photo.jpg", &upload);
        assert_eq!(
            lines,
            vec![
                "001 photo.jpg → photo.webp (2000x1500, 412.35 kB)",
                "    large_webp: 1000x750, 80.12 kB",
                "    medium_jpeg: failed: Codec failure: boom",
            ]
        );
    }

    #[test]
    fn passed_through_upload_shows_reason() {
        let upload = processed(UploadOutcome::PassedThrough(SkipReason::NotAnImage));
        let lines = format_upload(2, "notes.txt", &upload);
        assert_eq!(lines, vec!["002 notes.txt", "    passed through: not an image"]);
    }

    #[test]
    fn summary_counts() {
        let mut converted = processed(UploadOutcome::Converted);
        converted
            .formats
            .insert("small_webp".into(), descriptor("s", Some((500, 375)), 10));
        let skipped = processed(UploadOutcome::PassedThrough(SkipReason::ConversionDisabled));
        assert_eq!(
            format_convert_summary(&[converted, skipped]),
            "Converted 1 of 2 files, 1 variant"
        );

        let mut failed = processed(UploadOutcome::PrimaryFailed);
        failed.errors.push(JobFailure {
            key: "primary".into(),
            error: "x".into(),
        });
        assert_eq!(
            format_convert_summary(&[failed]),
            "Converted 0 of 1 file, 0 variants, 1 error"
        );
    }

    #[test]
    fn convert_output_ends_with_summary() {
        let lines = format_convert_output(
            &["a.jpg".to_string()],
            &[processed(UploadOutcome::Converted)],
        );
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "");
        assert!(lines[2].starts_with("Converted 1 of 1 file"));
    }

    #[test]
    fn plan_lines() {
        let primary = ConversionJob {
            kind: JobKind::Primary,
            target_format: Some(ImageFormatKind::Webp),
            resize: None,
            encode: EncodeOptions::Webp(WebpOptions::default()),
            auto_orient: true,
        };
        let bp = ConversionJob {
            kind: JobKind::Breakpoint {
                key: "large_webp".into(),
                threshold: 1000,
            },
            resize: Some(Resize::square(1000)),
            auto_orient: false,
            ..primary.clone()
        };
        let meta = ImageMetadata {
            width: 2000,
            height: 1500,
            format: Some(image::ImageFormat::Jpeg),
            byte_size: 412_350,
        };
        let plan = Plan::Convert {
            primary,
            breakpoints: vec![bp],
        };

        assert_eq!(
            format_plan("photo.jpg", Some(&meta), &plan),
            vec![
                "photo.jpg (2000x1500 jpeg, 412.35 kB)",
                "    primary: webp, full size, quality 100, auto-orient",
                "    large_webp: webp, fit 1000x1000, quality 100",
            ]
        );
    }

    #[test]
    fn plan_skip_line() {
        let lines = format_plan("a.gif", None, &Plan::Skip(SkipReason::SourceFormatDisabled));
        assert_eq!(
            lines,
            vec!["a.gif", "    skip: conversion from this format is disabled"]
        );
    }

    #[test]
    fn settings_lines() {
        let settings = Settings {
            convert_to: ConvertTo::Off,
            convert_from_png: false,
            ..Settings::default()
        };
        let lines = format_settings(&settings);
        assert_eq!(lines[0], "Convert to: off");
        assert_eq!(lines[1], "Convert from: JPEG, TIFF");
        assert_eq!(lines[2], "Size optimization: off");
        assert_eq!(lines[8], "    webp: quality 100, lossless off");
    }
}
