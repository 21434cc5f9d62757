//! Breakpoint planning: which responsive variants to generate.
//!
//! A breakpoint table maps a name to either a bare pixel threshold or a
//! threshold with a list of output formats:
//!
//! ```toml
//! [breakpoints]
//! thumb = 245                                   # one job, original format
//! large = { breakpoint = 1000, formats = ["webp", "jpeg"] }
//! medium = { threshold = 750, formats = ["avif"] }
//! ```
//!
//! Each entry expands into one job per format, keyed `<name>_<format>`, or a
//! single job keyed `<name>` when no formats are listed. A job is planned only
//! when its threshold is below the original width or height, so variants are
//! never upscaled. A table that fails validation is replaced by
//! [`BreakpointTable::builtin`] with a warning.

use super::job::{ConversionJob, JobKind, PRIMARY_KEY};
use crate::imaging::{ImageFormatKind, ImageMetadata, Resize, breakpoint_smaller_than};
use crate::settings::Settings;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Formats a breakpoint may request.
pub const BREAKPOINT_FORMATS: [ImageFormatKind; 4] = [
    ImageFormatKind::Jpeg,
    ImageFormatKind::Png,
    ImageFormatKind::Webp,
    ImageFormatKind::Avif,
];

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Threshold(u32),
    Detailed(RawDetailed),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDetailed {
    #[serde(alias = "threshold")]
    breakpoint: u32,
    #[serde(default)]
    formats: Vec<ImageFormatKind>,
}

/// One validated breakpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub name: String,
    pub threshold: u32,
    /// Empty means "re-encode in the original format".
    pub formats: Vec<ImageFormatKind>,
}

impl Breakpoint {
    fn keys(&self) -> Vec<String> {
        if self.formats.is_empty() {
            vec![self.name.clone()]
        } else {
            self.formats
                .iter()
                .map(|f| format!("{}_{}", self.name, f))
                .collect()
        }
    }
}

/// A validated breakpoint table, largest threshold first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointTable {
    entries: Vec<Breakpoint>,
}

impl BreakpointTable {
    /// large=1000, medium=750, small=500, each as WebP and JPEG.
    pub fn builtin() -> Self {
        let both = vec![ImageFormatKind::Webp, ImageFormatKind::Jpeg];
        Self::from_entries(vec![
            Breakpoint {
                name: "large".into(),
                threshold: 1000,
                formats: both.clone(),
            },
            Breakpoint {
                name: "medium".into(),
                threshold: 750,
                formats: both.clone(),
            },
            Breakpoint {
                name: "small".into(),
                threshold: 500,
                formats: both,
            },
        ])
    }

    fn from_entries(mut entries: Vec<Breakpoint>) -> Self {
        entries.sort_by(|a, b| b.threshold.cmp(&a.threshold).then(a.name.cmp(&b.name)));
        Self { entries }
    }

    pub fn entries(&self) -> &[Breakpoint] {
        &self.entries
    }

    /// Strictly parse a raw table.
    pub fn parse(raw: &toml::Value) -> Result<Self, String> {
        let table: BTreeMap<String, RawEntry> = raw
            .clone()
            .try_into()
            .map_err(|e: toml::de::Error| e.message().to_string())?;

        let mut entries = Vec::with_capacity(table.len());
        for (name, entry) in table {
            let (threshold, formats) = match entry {
                RawEntry::Threshold(t) => (t, Vec::new()),
                RawEntry::Detailed(d) => (d.breakpoint, d.formats),
            };
            if name.trim().is_empty() {
                return Err("breakpoint names must not be empty".into());
            }
            if threshold == 0 {
                return Err(format!("breakpoint '{name}' must be a positive pixel size"));
            }
            let mut seen = BTreeSet::new();
            for f in &formats {
                if !BREAKPOINT_FORMATS.contains(f) {
                    return Err(format!("breakpoint '{name}': format '{f}' is not allowed"));
                }
                if !seen.insert(*f) {
                    return Err(format!("breakpoint '{name}': format '{f}' listed twice"));
                }
            }
            entries.push(Breakpoint {
                name,
                threshold,
                formats,
            });
        }

        let mut keys = BTreeSet::new();
        for key in entries.iter().flat_map(Breakpoint::keys) {
            if key == PRIMARY_KEY {
                return Err(format!("output key '{key}' is reserved for the converted file"));
            }
            if !keys.insert(key.clone()) {
                return Err(format!("output key '{key}' is produced by two breakpoints"));
            }
        }

        Ok(Self::from_entries(entries))
    }

    /// Lenient parse: a missing table or one that fails validation yields
    /// the built-in table.
    pub fn resolve(raw: Option<&toml::Value>) -> Self {
        match raw {
            None => Self::builtin(),
            Some(value) => Self::parse(value).unwrap_or_else(|e| {
                warn!("Invalid breakpoint table ({e}), using the default table");
                Self::builtin()
            }),
        }
    }
}

impl Default for BreakpointTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Validate `raw` and plan against it.
pub fn plan_breakpoints(
    meta: &ImageMetadata,
    raw: Option<&toml::Value>,
    settings: &Settings,
) -> Vec<ConversionJob> {
    if !settings.responsive_dimensions {
        return Vec::new();
    }
    plan_with_table(meta, &BreakpointTable::resolve(raw), settings)
}

/// Expand a validated table into jobs for one image.
///
/// AVIF outputs are never resized: such a job re-encodes at original size.
pub fn plan_with_table(
    meta: &ImageMetadata,
    table: &BreakpointTable,
    settings: &Settings,
) -> Vec<ConversionJob> {
    if !settings.responsive_dimensions {
        return Vec::new();
    }

    let original = meta.format_kind();
    let mut jobs = Vec::new();
    for bp in table.entries() {
        if !breakpoint_smaller_than(bp.threshold, meta.dimensions()) {
            continue;
        }
        let targets: Vec<(String, Option<ImageFormatKind>)> = if bp.formats.is_empty() {
            vec![(bp.name.clone(), None)]
        } else {
            bp.formats
                .iter()
                .map(|f| (format!("{}_{}", bp.name, f), Some(*f)))
                .collect()
        };

        for (key, target_format) in targets {
            let Some(output) = target_format.or(original) else {
                debug!(%key, "Original format unknown, cannot re-encode breakpoint");
                continue;
            };
            let resize = (output != ImageFormatKind::Avif).then(|| Resize::square(bp.threshold));
            jobs.push(ConversionJob {
                kind: JobKind::Breakpoint {
                    key,
                    threshold: bp.threshold,
                },
                target_format,
                resize,
                encode: settings.encode_options(output),
                auto_orient: settings.auto_orientation,
            });
        }
    }
    debug!(
        "Planned {} breakpoint job(s) for {}x{}",
        jobs.len(),
        meta.width,
        meta.height
    );
    jobs
}
