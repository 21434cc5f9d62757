//! Conversion executor: run one planned job against the codec backend.
//!
//! ## Steps per job
//!
//! ```text
//! claim       create <output> exclusively; if taken, <stem>-1.<ext>, -2, ...
//! pre-pass    resize (if any) → re-encode → write <output>
//! floor       same format, no resize, not smaller than the source
//!             → overwrite <output> with a byte copy of the source
//! post-pass   (sizeOptimization or autoOrientation)
//!             re-encode <output> → <output stem>.opt.<ext>
//!             strictly smaller → rename over <output>
//!             otherwise        → delete it (regression)
//! ```
//!
//! Jobs share nothing but the read-only source, so they can run in any order
//! or concurrently. Every file written is one this job created: two uploads
//! that map to the same name, or a file already sitting at that name, push
//! the artifact to the next free suffix instead. The source file is never
//! touched here; deleting it is the caller's decision.

use super::input::InputImage;
use super::job::{ConversionJob, ConversionResult, PassOutcome};
use crate::imaging::{BackendError, ImageBackend, ImageFormatKind, ImageSource, TransformParams};
use crate::settings::Settings;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ExecuteError {
    #[error("Codec failure: {0}")]
    Backend(#[from] BackendError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cancelled")]
    Cancelled,
}

/// Request-wide abort flag. Checked before each job and between passes.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Preferred location of a job's artifact. [`execute`] claims it, or the
/// next free suffix if it is taken.
///
/// - primary: `<dir>/<stem>.<ext>`; `<dir>/<stem>_<hash>.<ext>` if that would
///   be the source itself
/// - breakpoint: `<dir>/<key>_<hash>.<ext>`
pub fn artifact_path(
    dir: &Path,
    image: &InputImage,
    hash: &str,
    job: &ConversionJob,
) -> PathBuf {
    let ext = job.output_format().name();
    if job.is_primary() {
        let path = dir.join(format!("{}.{ext}", image.stem()));
        if image.source.as_path() == Some(path.as_path()) {
            return dir.join(format!("{}_{hash}.{ext}", image.stem()));
        }
        path
    } else {
        dir.join(format!("{}_{hash}.{ext}", job.key()))
    }
}

/// Sibling path for the post-pass candidate: `photo.webp` → `photo.opt.webp`.
fn candidate_path(output: &Path, format: ImageFormatKind) -> PathBuf {
    output.with_extension(format!("opt.{}", format.name()))
}

/// Suffixed names tried after `preferred` is taken.
const MAX_CLAIM_SUFFIX: u32 = 999;

/// Atomically create an empty file at `preferred`, or at the first free
/// `<stem>-<n>.<ext>` beside it. The returned path belongs to the caller.
pub fn claim_path(preferred: &Path) -> std::io::Result<PathBuf> {
    let stem = preferred
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = preferred
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    for n in 0..=MAX_CLAIM_SUFFIX {
        let candidate = if n == 0 {
            preferred.to_path_buf()
        } else {
            preferred.with_file_name(format!("{stem}-{n}{ext}"))
        };
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!("no free name left for {}", preferred.display()),
    ))
}

fn discard(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {}: {e}", path.display()),
    }
}

/// Run `job` for `image`, writing to `output` or, if something already
/// exists there, to the next free suffix. The result carries the final path.
pub fn execute(
    backend: &impl ImageBackend,
    job: &ConversionJob,
    image: &InputImage,
    settings: &Settings,
    output: &Path,
    cancel: &Cancellation,
) -> Result<ConversionResult, ExecuteError> {
    if cancel.is_cancelled() {
        return Err(ExecuteError::Cancelled);
    }

    let output = claim_path(output)?;
    let output = output.as_path();
    let params = TransformParams {
        source: image.source.clone(),
        output: output.to_path_buf(),
        resize: job.resize,
        encode: job.encode,
        auto_orient: job.auto_orient,
    };
    let written = backend.transform(&params).inspect_err(|_| discard(output))?;

    let mut result = ConversionResult {
        key: job.key().to_string(),
        path: output.to_path_buf(),
        format: written.format,
        width: written.width,
        height: written.height,
        byte_size: written.byte_size,
        post_pass: PassOutcome::NotRun,
        kept_original: false,
    };

    if let Some(original) = image.metadata(backend) {
        let same_format = original.format_kind() == Some(written.format);
        if job.resize.is_none() && same_format && written.byte_size >= original.byte_size {
            debug!(key = %result.key, "Re-encode not smaller than source, keeping source bytes");
            result.byte_size = image.source.copy_to(output)?;
            result.width = original.width;
            result.height = original.height;
            result.kept_original = true;
            return Ok(result);
        }
    }

    if settings.wants_post_pass() {
        if cancel.is_cancelled() {
            discard(output);
            return Err(ExecuteError::Cancelled);
        }
        let (outcome, size) = post_pass(backend, output, written.format, settings)?;
        result.post_pass = outcome;
        result.byte_size = size;
    }

    Ok(result)
}

/// Re-encode `output` in place if that makes it strictly smaller.
/// Returns the outcome and the final size of `output`.
fn post_pass(
    backend: &impl ImageBackend,
    output: &Path,
    format: ImageFormatKind,
    settings: &Settings,
) -> Result<(PassOutcome, u64), ExecuteError> {
    let before = std::fs::metadata(output)?.len();
    let candidate = match claim_path(&candidate_path(output, format)) {
        Ok(path) => path,
        Err(e) => {
            warn!("No room for an optimization candidate beside {}: {e}", output.display());
            return Ok((PassOutcome::Failed, before));
        }
    };
    let params = TransformParams {
        source: ImageSource::path(output),
        output: candidate.clone(),
        resize: None,
        encode: settings.encode_options(format),
        auto_orient: settings.auto_orientation,
    };

    match backend.transform(&params) {
        Ok(optimized) if optimized.byte_size < before => {
            std::fs::rename(&candidate, output)?;
            Ok((
                PassOutcome::Optimized {
                    saved_bytes: before - optimized.byte_size,
                },
                optimized.byte_size,
            ))
        }
        Ok(optimized) => {
            debug!(
                "Optimization pass regressed {} ({} >= {} bytes), discarded",
                output.display(),
                optimized.byte_size,
                before
            );
            discard(&candidate);
            Ok((PassOutcome::RegressionDetected, before))
        }
        Err(e) => {
            warn!("Optimization pass failed for {}: {e}", output.display());
            discard(&candidate);
            Ok((PassOutcome::Failed, before))
        }
    }
}
