//! Host configuration module.
//!
//! Handles loading, validating, and merging `img-convert.toml`. This is the
//! deployment-side configuration (where settings are stored, how many workers
//! run, which breakpoints exist). The user-editable conversion settings live
//! in the settings store instead; see [`settings`](crate::settings).
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [store]
//! path = ".img-convert"     # Directory holding store.json
//!
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//!
//! [breakpoints]
//! large = { breakpoint = 1000, formats = ["webp", "jpeg"] }
//! medium = { breakpoint = 750, formats = ["webp", "jpeg"] }
//! small = { breakpoint = 500, formats = ["webp", "jpeg"] }
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse: override just the values you want. Tables are
//! merged key by key with the stock defaults, except `[breakpoints]`: a user
//! table replaces the stock one entirely, so dropping a breakpoint is just a
//! matter of leaving it out.
//!
//! Unknown keys are rejected to catch typos early. The breakpoint table itself
//! is validated by the [planner](crate::pipeline::planner), which falls back
//! to the built-in table when it is invalid.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILENAME: &str = "img-convert.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Host configuration loaded from `img-convert.toml`.
///
/// All fields have sensible defaults. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    /// Settings store location.
    pub store: StoreConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
    /// Raw breakpoint table. `None` means the built-in table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakpoints: Option<toml::Value>,
}

impl HostConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.path.trim().is_empty() {
            return Err(ConfigError::Validation(
                "store.path must not be empty".into(),
            ));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn store_dir(&self) -> PathBuf {
        PathBuf::from(&self.store.path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Directory holding the settings store document.
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: ".img-convert".to_string(),
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel conversion workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(HostConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// [`merge_toml`], except a `breakpoints` key in `overlay` replaces the base
/// table instead of merging into it.
pub fn merge_config(base: toml::Value, overlay: toml::Value) -> toml::Value {
    let toml::Value::Table(mut overlay_table) = overlay else {
        return merge_toml(base, overlay);
    };
    let breakpoints = overlay_table.remove("breakpoints");
    let merged = merge_toml(base, toml::Value::Table(overlay_table));
    match (merged, breakpoints) {
        (toml::Value::Table(mut table), Some(bp)) => {
            table.insert("breakpoints".to_string(), bp);
            toml::Value::Table(table)
        }
        (merged, _) => merged,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<HostConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_config(base, ov),
        None => base,
    };
    let config: HostConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from the given file.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<HostConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `img-convert.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# img-convert Configuration
# ==========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Conversion settings (target format, quality, responsive variants on/off)
# are not set here: they live in the settings store and are edited with
# `img-convert settings set`.
#
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Settings store
# ---------------------------------------------------------------------------
[store]
# Directory holding store.json. Relative paths resolve against the
# working directory.
path = ".img-convert"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel conversion workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# ---------------------------------------------------------------------------
# Responsive breakpoints
# ---------------------------------------------------------------------------
# Used when `responsiveDimensions` is on. A variant is generated when the
# breakpoint is smaller than the original width or height; it is resized to
# fit inside a breakpoint x breakpoint box.
#
# Each entry is either a bare size (one variant in the original format):
#   thumb = 245
# or a size with output formats (one variant per format, keyed name_format):
#   large = { breakpoint = 1000, formats = ["webp", "jpeg"] }
#
# Formats: jpeg, png, webp, avif. AVIF variants are never resized.
# An invalid table falls back to the one below. Defining this table replaces
# it entirely.
[breakpoints]
large = { breakpoint = 1000, formats = ["webp", "jpeg"] }
medium = { breakpoint = 750, formats = ["webp", "jpeg"] }
small = { breakpoint = 500, formats = ["webp", "jpeg"] }
"##
}
