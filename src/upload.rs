//! Upload conversion: the interface the upload pipeline calls.
//!
//! For each uploaded file the converter either passes it through unchanged or
//! returns a replacement descriptor (new name, extension, mime type and size)
//! plus named responsive variants:
//!
//! ```text
//! photo.jpg (2000x1500)  ──►  photo.webp                      replaces the upload
//!                             formats.large_webp   1000x750
//!                             formats.large_jpeg   1000x750
//!                             formats.medium_webp   750x563
//!                             ...
//! ```
//!
//! ## Concurrency
//!
//! Files of one request are converted in parallel with rayon. Within a file
//! the primary job and every breakpoint job fan out together; the converter
//! waits for all of them before touching the source. The temporary upload
//! file is deleted only when the primary conversion succeeded, because
//! breakpoint jobs read from it until the fan-in barrier.
//!
//! The settings snapshot is read once per request and shared read-only by
//! all files.
//!
//! ## Failure policy
//!
//! Nothing here fails the upload. A skipped file passes through unchanged, a
//! failed breakpoint job is recorded in [`ProcessedUpload::errors`] while its
//! siblings carry on, and a failed primary job keeps the original file. When
//! the request is cancelled, every artifact written for the file is removed
//! and the file passes through.

use crate::imaging::{ImageBackend, ImageFormatKind, ImageSource};
use crate::pipeline::{
    BreakpointTable, Cancellation, ConversionJob, ConversionResult, Decision, ExecuteError,
    InputImage, JobFailure, PRIMARY_KEY, SkipReason, artifact_path, decide_primary_conversion,
    execute, plan_with_table,
};
use crate::settings::{Settings, SettingsService};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Length of the content hash used when an upload arrives without one.
const SHORT_HASH_LEN: usize = 10;

/// A file as handed over by the multipart layer.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Client-side file name, extension included.
    pub name: String,
    /// Storage hash assigned by the host; generated from the content if absent.
    pub hash: Option<String>,
    pub mime: Option<String>,
    pub source: ImageSource,
    /// Request-scoped scratch directory. Artifacts go here when set, otherwise
    /// beside a path source or into the system temp directory for streams.
    pub tmp_working_directory: Option<PathBuf>,
}

impl UploadedFile {
    /// A file already on disk, named after its path.
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let mime = ImageFormatKind::from_path(path).map(|f| f.mime().to_string());
        Self {
            name,
            hash: None,
            mime,
            source: ImageSource::path(path),
            tmp_working_directory: None,
        }
    }

    fn output_dir(&self) -> PathBuf {
        if let Some(dir) = &self.tmp_working_directory {
            return dir.clone();
        }
        self.source
            .as_path()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir)
    }
}

/// Caller-supplied metadata that travels with the upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub name: Option<String>,
    pub alternative_text: Option<String>,
    pub caption: Option<String>,
}

/// Description of one stored file: the upload itself, its replacement, or a
/// responsive variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactDescriptor {
    pub name: String,
    pub hash: String,
    /// Dotted extension, e.g. `.webp`.
    pub ext: String,
    pub mime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    pub size_in_bytes: u64,
    /// Size in kilobytes (bytes / 1000), two decimals.
    pub size: f64,
}

/// Bytes to kilobytes, rounded to two decimals.
pub fn kilobytes(bytes: u64) -> f64 {
    (bytes as f64 / 1000.0 * 100.0).round() / 100.0
}

fn replace_extension(name: &str, format: ImageFormatKind) -> String {
    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name);
    format!("{stem}.{}", format.name())
}

impl ArtifactDescriptor {
    fn from_result(name: String, hash: String, result: &ConversionResult) -> Self {
        Self {
            name,
            hash,
            ext: result.format.dotted_ext(),
            mime: result.mime().to_string(),
            path: Some(result.path.clone()),
            width: Some(result.width),
            height: Some(result.height),
            size_in_bytes: result.byte_size,
            size: kilobytes(result.byte_size),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UploadOutcome {
    /// The upload was replaced by a converted file.
    Converted,
    /// No conversion applied; the upload is unchanged.
    PassedThrough(SkipReason),
    /// The primary job failed; the upload is unchanged but breakpoint
    /// variants that succeeded are attached.
    PrimaryFailed,
    /// The request was aborted; nothing written for this file is kept.
    Cancelled,
}

/// Result of converting one upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedUpload {
    /// The replacement when converted, otherwise the original upload.
    pub file: ArtifactDescriptor,
    pub file_info: FileInfo,
    /// Responsive variants keyed by output key.
    pub formats: BTreeMap<String, ArtifactDescriptor>,
    pub outcome: UploadOutcome,
    /// Per-job codec failures.
    pub errors: Vec<JobFailure>,
}

/// What will happen to an upload, without running anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    Skip(SkipReason),
    Convert {
        primary: ConversionJob,
        breakpoints: Vec<ConversionJob>,
    },
}

/// Converts uploads with an injected codec backend and settings service.
pub struct UploadConverter<B: ImageBackend> {
    backend: B,
    settings: SettingsService,
    breakpoints: BreakpointTable,
    cancel: Cancellation,
}

impl<B: ImageBackend> UploadConverter<B> {
    pub fn new(backend: B, settings: SettingsService, breakpoints: BreakpointTable) -> Self {
        Self {
            backend,
            settings,
            breakpoints,
            cancel: Cancellation::new(),
        }
    }

    /// Share an abort flag with the enclosing request.
    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn settings(&self) -> &SettingsService {
        &self.settings
    }

    /// Decide and plan for one image.
    pub fn plan(&self, image: &InputImage, settings: &Settings) -> Plan {
        match decide_primary_conversion(&self.backend, image, settings) {
            Decision::Skip(reason) => Plan::Skip(reason),
            Decision::Convert(primary) => {
                let breakpoints = match image.metadata(&self.backend) {
                    Some(meta) => plan_with_table(&meta, &self.breakpoints, settings),
                    None => Vec::new(),
                };
                Plan::Convert {
                    primary,
                    breakpoints,
                }
            }
        }
    }

    /// Convert every file of one request. Output order matches input order.
    pub fn convert_all(&self, files: Vec<(UploadedFile, FileInfo)>) -> Vec<ProcessedUpload> {
        let settings = self.settings.settings();
        files
            .into_par_iter()
            .map(|(file, info)| self.convert(file, info, &settings))
            .collect()
    }

    /// Convert one file against a settings snapshot.
    pub fn convert(&self, file: UploadedFile, info: FileInfo, settings: &Settings) -> ProcessedUpload {
        let mut image = InputImage::new(file.source.clone(), file.name.clone());
        image.mime = file.mime.clone();

        if self.cancel.is_cancelled() {
            return passed_through(&file, &image, info, UploadOutcome::Cancelled);
        }

        let (primary, breakpoints) = match self.plan(&image, settings) {
            Plan::Skip(reason) => {
                return passed_through(&file, &image, info, UploadOutcome::PassedThrough(reason));
            }
            Plan::Convert {
                primary,
                breakpoints,
            } => (primary, breakpoints),
        };

        let hash = file.hash.clone().unwrap_or_else(|| short_hash(&image));
        let dir = file.output_dir();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!(file = %file.name, "Cannot create {}: {e}", dir.display());
        }

        let run = |job: &ConversionJob| {
            let output = artifact_path(&dir, &image, &hash, job);
            execute(&self.backend, job, &image, settings, &output, &self.cancel)
        };

        // Fan out: primary alongside every breakpoint; join is the barrier.
        let (primary_result, breakpoint_results) = rayon::join(
            || run(&primary),
            || {
                breakpoints
                    .par_iter()
                    .map(|job| (job.key().to_string(), run(job)))
                    .collect::<Vec<_>>()
            },
        );

        if self.cancel.is_cancelled() {
            let written = std::iter::once(&primary_result)
                .chain(breakpoint_results.iter().map(|(_, r)| r))
                .filter_map(|r| r.as_ref().ok());
            for result in written {
                remove_artifact(&result.path);
            }
            return passed_through(&file, &image, info, UploadOutcome::Cancelled);
        }

        let mut processed = passed_through(&file, &image, info, UploadOutcome::PrimaryFailed);

        for (key, result) in breakpoint_results {
            match result {
                Ok(r) => {
                    let name = match r.format {
                        f if image.declared_format() == Some(f) => format!("{key}_{}", file.name),
                        f => format!("{key}_{}", replace_extension(&file.name, f)),
                    };
                    let descriptor = ArtifactDescriptor::from_result(name, format!("{key}_{hash}"), &r);
                    processed.formats.insert(key, descriptor);
                }
                Err(e) => record_failure(&mut processed, &file.name, key, e),
            }
        }

        match primary_result {
            Ok(r) => {
                let name = replace_extension(&file.name, r.format);
                processed.file = ArtifactDescriptor::from_result(name.clone(), hash, &r);
                processed.file_info.name = Some(name);
                processed.outcome = UploadOutcome::Converted;
                if let Some(source) = file.source.as_path() {
                    if source != r.path {
                        remove_artifact(source);
                    }
                }
                info!(
                    file = %file.name,
                    "Converted to {} with {} variant(s)",
                    r.format,
                    processed.formats.len()
                );
            }
            Err(e) => record_failure(&mut processed, &file.name, PRIMARY_KEY.to_string(), e),
        }

        processed
    }
}

fn record_failure(processed: &mut ProcessedUpload, file: &str, key: String, error: ExecuteError) {
    warn!(file = %file, job = %key, "Conversion job failed: {error}");
    processed.errors.push(JobFailure {
        key,
        error: error.to_string(),
    });
}

fn remove_artifact(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        warn!("Could not remove {}: {e}", path.display());
    }
}

/// First characters of the content's SHA-256; falls back to the file stem.
fn short_hash(image: &InputImage) -> String {
    match image.source.content_hash() {
        Ok(hex) => hex[..SHORT_HASH_LEN].to_string(),
        Err(e) => {
            warn!(file = %image.name, "Could not hash upload: {e}");
            image.stem().to_string()
        }
    }
}

/// The upload described as-is.
fn passed_through(
    file: &UploadedFile,
    image: &InputImage,
    info: FileInfo,
    outcome: UploadOutcome,
) -> ProcessedUpload {
    let meta = image.cached_metadata();
    let format = meta
        .and_then(|m| m.format_kind())
        .or_else(|| image.declared_format());
    let size_in_bytes = match meta {
        Some(m) => m.byte_size,
        None => file.source.byte_size().unwrap_or_default(),
    };
    if let UploadOutcome::PassedThrough(reason) = outcome {
        debug!(file = %file.name, "Passing through unchanged: {reason}");
    }

    ProcessedUpload {
        file: ArtifactDescriptor {
            name: file.name.clone(),
            hash: file.hash.clone().unwrap_or_default(),
            ext: Path::new(&file.name)
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default(),
            mime: file
                .mime
                .clone()
                .or_else(|| format.map(|f| f.mime().to_string()))
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            path: file.source.as_path().map(Path::to_path_buf),
            width: meta.map(|m| m.width),
            height: meta.map(|m| m.height),
            size_in_bytes,
            size: kilobytes(size_in_bytes),
        },
        file_info: info,
        formats: BTreeMap::new(),
        outcome,
        errors: Vec::new(),
    }
}
