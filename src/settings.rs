//! Conversion settings: the persisted, user-editable configuration.
//!
//! Settings are stored as one JSON object under [`NAMESPACE`] / [`SETTINGS_KEY`]
//! in the [settings store](crate::store). Field names follow the wire format
//! used by the admin surface:
//!
//! ```json
//! {
//!   "convertTo": "webp",
//!   "convertFromJPEG": true,
//!   "convertFromPNG": true,
//!   "convertFromTIFF": true,
//!   "sizeOptimization": false,
//!   "responsiveDimensions": false,
//!   "autoOrientation": false,
//!   "formatOptions": {
//!     "jpeg": { "quality": 80 },
//!     "png":  { "compressionLevel": 6, "adaptiveFiltering": false },
//!     "webp": { "quality": 100, "lossless": false },
//!     "avif": { "quality": 80, "effort": 4 }
//!   }
//! }
//! ```
//!
//! Two validation modes share one field-by-field checker:
//!
//! - [`resolve`] is lenient. Every missing or invalid field is replaced by its
//!   default and a warning is logged. It never fails; the pipeline always gets
//!   a usable snapshot.
//! - [`validate_update`] is strict. Any invalid field rejects the whole update
//!   with the list of offending fields. Missing fields still take defaults and
//!   unknown fields are ignored.

use crate::imaging::{
    AvifOptions, EncodeOptions, ImageFormatKind, JpegOptions, PngOptions, WebpOptions,
};
use crate::store::{SettingsStore, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

pub const NAMESPACE: &str = "plugin::img-convert";
pub const SETTINGS_KEY: &str = "settings";

const QUALITY_RANGE: RangeInclusive<u32> = 1..=100;
const LEVEL_RANGE: RangeInclusive<u32> = 0..=9;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Settings store error: {0}")]
    Store(#[from] StoreError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid settings: {}", join_errors(.0))]
    Validation(Vec<FieldError>),
}

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// One rejected field, addressed by its dotted path (`formatOptions.webp.quality`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

/// Target format for primary conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConvertTo {
    #[default]
    Webp,
    Avif,
    Off,
}

impl ConvertTo {
    pub const NAMES: [&'static str; 3] = ["webp", "avif", "off"];

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "webp" => Some(ConvertTo::Webp),
            "avif" => Some(ConvertTo::Avif),
            "off" => Some(ConvertTo::Off),
            _ => None,
        }
    }

    /// `None` when conversion is disabled.
    pub fn target_format(self) -> Option<ImageFormatKind> {
        match self {
            ConvertTo::Webp => Some(ImageFormatKind::Webp),
            ConvertTo::Avif => Some(ImageFormatKind::Avif),
            ConvertTo::Off => None,
        }
    }
}

/// Per-format encoder knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatOptions {
    pub jpeg: JpegOptions,
    pub png: PngOptions,
    pub webp: WebpOptions,
    pub avif: AvifOptions,
}

impl FormatOptions {
    /// Encoder settings for writing `format`.
    pub fn encode_options(&self, format: ImageFormatKind) -> EncodeOptions {
        match format {
            ImageFormatKind::Jpeg => EncodeOptions::Jpeg(self.jpeg),
            ImageFormatKind::Png => EncodeOptions::Png(self.png),
            ImageFormatKind::Webp => EncodeOptions::Webp(self.webp),
            ImageFormatKind::Avif => EncodeOptions::Avif(self.avif),
            ImageFormatKind::Tiff => EncodeOptions::Tiff,
        }
    }
}

/// Immutable settings snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub convert_to: ConvertTo,
    #[serde(rename = "convertFromJPEG")]
    pub convert_from_jpeg: bool,
    #[serde(rename = "convertFromPNG")]
    pub convert_from_png: bool,
    #[serde(rename = "convertFromTIFF")]
    pub convert_from_tiff: bool,
    pub size_optimization: bool,
    pub responsive_dimensions: bool,
    pub auto_orientation: bool,
    pub format_options: FormatOptions,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            convert_to: ConvertTo::Webp,
            convert_from_jpeg: true,
            convert_from_png: true,
            convert_from_tiff: true,
            size_optimization: false,
            responsive_dimensions: false,
            auto_orientation: false,
            format_options: FormatOptions::default(),
        }
    }
}

impl Settings {
    /// Whether conversion is enabled for uploads of `format`.
    /// Formats other than JPEG, PNG and TIFF are never converted.
    pub fn converts_from(&self, format: ImageFormatKind) -> bool {
        match format {
            ImageFormatKind::Jpeg => self.convert_from_jpeg,
            ImageFormatKind::Png => self.convert_from_png,
            ImageFormatKind::Tiff => self.convert_from_tiff,
            ImageFormatKind::Webp | ImageFormatKind::Avif => false,
        }
    }

    pub fn encode_options(&self, format: ImageFormatKind) -> EncodeOptions {
        self.format_options.encode_options(format)
    }

    /// Whether jobs get the re-encode / orientation post-pass.
    pub fn wants_post_pass(&self) -> bool {
        self.size_optimization || self.auto_orientation
    }
}

// =============================================================================
// Field-by-field validation
// =============================================================================

/// Check a raw JSON payload field by field.
///
/// Returns the settings with every valid field applied over the defaults,
/// plus one [`FieldError`] per rejected field. Unknown keys are ignored and a
/// JSON `null` counts as absent.
pub fn validate(raw: &Value) -> (Settings, Vec<FieldError>) {
    let mut settings = Settings::default();
    let mut errors = Vec::new();

    let Some(obj) = raw.as_object() else {
        errors.push(FieldError::new("", "expected a JSON object"));
        return (settings, errors);
    };

    match field(obj, "convertTo") {
        None => {}
        Some(Value::String(s)) => match ConvertTo::parse(s) {
            Some(c) => settings.convert_to = c,
            None => errors.push(FieldError::new(
                "convertTo",
                format!("must be one of {:?}", ConvertTo::NAMES),
            )),
        },
        Some(_) => errors.push(FieldError::new("convertTo", "must be a string")),
    }

    let s = &mut settings;
    let e = &mut errors;
    read_bool(obj, "", "convertFromJPEG", &mut s.convert_from_jpeg, e);
    read_bool(obj, "", "convertFromPNG", &mut s.convert_from_png, e);
    read_bool(obj, "", "convertFromTIFF", &mut s.convert_from_tiff, e);
    read_bool(obj, "", "sizeOptimization", &mut s.size_optimization, e);
    read_bool(obj, "", "responsiveDimensions", &mut s.responsive_dimensions, e);
    read_bool(obj, "", "autoOrientation", &mut s.auto_orientation, e);

    if let Some(options) = object_field(obj, "", "formatOptions", e) {
        let fo = &mut s.format_options;
        let prefix = "formatOptions.";
        if let Some(jpeg) = object_field(options, prefix, "jpeg", e) {
            let p = "formatOptions.jpeg.";
            read_ranged(jpeg, p, "quality", QUALITY_RANGE, &mut fo.jpeg.quality, e);
        }
        if let Some(png) = object_field(options, prefix, "png", e) {
            let p = "formatOptions.png.";
            read_ranged(png, p, "compressionLevel", LEVEL_RANGE, &mut fo.png.compression_level, e);
            read_bool(png, p, "adaptiveFiltering", &mut fo.png.adaptive_filtering, e);
        }
        if let Some(webp) = object_field(options, prefix, "webp", e) {
            let p = "formatOptions.webp.";
            read_ranged(webp, p, "quality", QUALITY_RANGE, &mut fo.webp.quality, e);
            read_bool(webp, p, "lossless", &mut fo.webp.lossless, e);
        }
        if let Some(avif) = object_field(options, prefix, "avif", e) {
            let p = "formatOptions.avif.";
            read_ranged(avif, p, "quality", QUALITY_RANGE, &mut fo.avif.quality, e);
            read_ranged(avif, p, "effort", LEVEL_RANGE, &mut fo.avif.effort, e);
        }
    }

    (settings, errors)
}

fn field<'a>(obj: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    obj.get(name).filter(|v| !v.is_null())
}

fn read_bool(
    obj: &Map<String, Value>,
    prefix: &str,
    name: &str,
    target: &mut bool,
    errors: &mut Vec<FieldError>,
) {
    match field(obj, name) {
        None => {}
        Some(Value::Bool(b)) => *target = *b,
        Some(_) => errors.push(FieldError::new(
            format!("{prefix}{name}"),
            "must be a boolean",
        )),
    }
}

fn read_ranged(
    obj: &Map<String, Value>,
    prefix: &str,
    name: &str,
    range: RangeInclusive<u32>,
    target: &mut u32,
    errors: &mut Vec<FieldError>,
) {
    let Some(value) = field(obj, name) else {
        return;
    };
    match value.as_u64().and_then(|n| u32::try_from(n).ok()) {
        Some(n) if range.contains(&n) => *target = n,
        _ => errors.push(FieldError::new(
            format!("{prefix}{name}"),
            format!(
                "must be an integer between {} and {}",
                range.start(),
                range.end()
            ),
        )),
    }
}

fn object_field<'a>(
    obj: &'a Map<String, Value>,
    prefix: &str,
    name: &str,
    errors: &mut Vec<FieldError>,
) -> Option<&'a Map<String, Value>> {
    match field(obj, name) {
        None => None,
        Some(Value::Object(inner)) => Some(inner),
        Some(_) => {
            errors.push(FieldError::new(format!("{prefix}{name}"), "must be an object"));
            None
        }
    }
}

/// Lenient resolve: merge a persisted payload with defaults. Never fails.
pub fn resolve(persisted: Option<&Value>) -> Settings {
    let Some(raw) = persisted else {
        return Settings::default();
    };
    let (settings, errors) = validate(raw);
    if !raw.is_object() {
        warn!("Stored settings are malformed, using defaults");
        return settings;
    }
    for error in &errors {
        warn!(field = %error.field, "Invalid stored setting ({}), using default", error.message);
    }
    settings
}

/// Strict validation for administrative writes.
pub fn validate_update(raw: &Value) -> Result<Settings, SettingsError> {
    let (settings, errors) = validate(raw);
    if errors.is_empty() {
        Ok(settings)
    } else {
        Err(SettingsError::Validation(errors))
    }
}

/// Recursively lay `overlay` on top of `base`; objects merge key by key,
/// anything else in `overlay` wins.
fn merge_json(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_val) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_val) => merge_json(base_val, overlay_val),
                    None => overlay_val,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

// =============================================================================
// Service
// =============================================================================

/// Reads and writes settings through an injected store.
#[derive(Clone)]
pub struct SettingsService {
    store: Arc<dyn SettingsStore>,
}

impl SettingsService {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    /// Current settings snapshot. Store failures degrade to defaults.
    pub fn settings(&self) -> Settings {
        match self.store.get(NAMESPACE, SETTINGS_KEY) {
            Ok(raw) => resolve(raw.as_ref()),
            Err(e) => {
                warn!("Could not read settings ({e}), using defaults");
                Settings::default()
            }
        }
    }

    /// Persist a full settings object.
    pub fn update(&self, settings: &Settings) -> Result<(), SettingsError> {
        let value = serde_json::to_value(settings)?;
        self.store.set(NAMESPACE, SETTINGS_KEY, value)?;
        Ok(())
    }

    /// Validate a raw payload strictly, then persist it.
    pub fn update_from(&self, raw: &Value) -> Result<Settings, SettingsError> {
        let settings = validate_update(raw)?;
        self.update(&settings)?;
        Ok(settings)
    }

    /// Fill any key missing from the stored object with its default.
    /// Stored values win. Writes only when something was added. An unreadable
    /// store document is replaced with defaults; only I/O failures are errors.
    pub fn bootstrap(&self) -> Result<Settings, SettingsError> {
        let stored = match self.store.get(NAMESPACE, SETTINGS_KEY) {
            Ok(stored) => stored,
            Err(e @ (StoreError::Json(_) | StoreError::Malformed(_))) => {
                warn!("Settings store is unreadable ({e}), replacing with defaults");
                None
            }
            Err(e) => return Err(e.into()),
        };
        let defaults = serde_json::to_value(Settings::default())?;

        let merged = match &stored {
            Some(v) if v.is_object() => merge_json(defaults, v.clone()),
            Some(_) => {
                warn!("Stored settings are malformed, replacing with defaults");
                defaults
            }
            None => defaults,
        };

        if stored.as_ref() != Some(&merged) {
            debug!("Writing default settings to the store");
            self.store.set(NAMESPACE, SETTINGS_KEY, merged.clone())?;
        }
        Ok(resolve(Some(&merged)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::Quality;
    use crate::store::{JsonFileStore, MemoryStore, STORE_FILENAME};
    use serde_json::json;

    #[test]
    fn resolve_none_is_default() {
        assert_eq!(resolve(None), Settings::default());
    }

    #[test]
    fn default_values() {
        let s = Settings::default();
        assert_eq!(s.convert_to, ConvertTo::Webp);
        assert!(s.convert_from_jpeg && s.convert_from_png && s.convert_from_tiff);
        assert!(!s.size_optimization && !s.responsive_dimensions && !s.auto_orientation);
        assert_eq!(s.format_options.webp.quality, 100);
        assert_eq!(s.format_options.avif.quality, 80);
        assert_eq!(s.format_options.jpeg.quality, 80);
        assert_eq!(s.format_options.png.compression_level, 6);
        assert_eq!(s.format_options.avif.effort, 4);
    }

    #[test]
    fn wire_names_are_camel_case() {
        let value = serde_json::to_value(Settings::default()).unwrap();
        let obj = value.as_object().unwrap();
        for key in [
            "convertTo",
            "convertFromJPEG",
            "convertFromPNG",
            "convertFromTIFF",
            "sizeOptimization",
            "responsiveDimensions",
            "autoOrientation",
            "formatOptions",
        ] {
            assert!(obj.contains_key(key), "missing {key}");
        }
        assert_eq!(value["formatOptions"]["png"]["compressionLevel"], json!(6));
    }

    #[test]
    fn resolve_keeps_valid_fields_and_defaults_invalid_ones() {
        let raw = json!({
            "convertTo": "avif",
            "convertFromPNG": "yes",
            "responsiveDimensions": true,
            "formatOptions": { "webp": { "quality": 0, "lossless": true } }
        });
        let s = resolve(Some(&raw));
        assert_eq!(s.convert_to, ConvertTo::Avif);
        assert!(s.convert_from_png);
        assert!(s.responsive_dimensions);
        assert_eq!(s.format_options.webp.quality, 100);
        assert!(s.format_options.webp.lossless);
    }

    #[test]
    fn resolve_never_panics_on_malformed_payloads() {
        let payloads = [
            json!(null),
            json!(42),
            json!("settings"),
            json!([1, 2]),
            json!({"convertTo": 7}),
            json!({"convertTo": "gif"}),
            json!({"formatOptions": "fast"}),
            json!({"formatOptions": {"avif": {"quality": 101, "effort": -1}}}),
            json!({"formatOptions": {"png": {"compressionLevel": 10.5}}}),
            json!({"formatOptions": {"jpeg": {"quality": 4294967396u64}}}),
        ];
        for raw in &payloads {
            let s = resolve(Some(raw));
            let fo = s.format_options;
            for q in [fo.jpeg.quality, fo.webp.quality, fo.avif.quality] {
                assert!(Quality::is_valid(q), "{raw}: quality {q}");
            }
            assert!(PngOptions::is_valid_compression_level(fo.png.compression_level));
            assert!(AvifOptions::is_valid_effort(fo.avif.effort));
        }
    }

    #[test]
    fn validate_reports_each_bad_field_by_path() {
        let raw = json!({
            "convertTo": "gif",
            "sizeOptimization": 1,
            "formatOptions": { "avif": { "effort": 12 }, "png": [] }
        });
        let (_, errors) = validate(&raw);
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "convertTo",
                "sizeOptimization",
                "formatOptions.png",
                "formatOptions.avif.effort"
            ]
        );
    }

    #[test]
    fn validate_ignores_unknown_and_null_fields() {
        let raw = json!({"somethingElse": true, "convertTo": null, "formatOptions": {"tiff": {}}});
        let (settings, errors) = validate(&raw);
        assert!(errors.is_empty());
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn validate_update_is_strict() {
        let err = validate_update(&json!({"convertTo": "jpeg"})).unwrap_err();
        assert!(matches!(err, SettingsError::Validation(ref e) if e.len() == 1));
        assert!(err.to_string().contains("convertTo"));

        let ok = validate_update(&json!({"convertTo": "off"})).unwrap();
        assert_eq!(ok.convert_to, ConvertTo::Off);
    }

    #[test]
    fn converts_from_only_source_formats() {
        let s = Settings {
            convert_from_png: false,
            ..Settings::default()
        };
        assert!(s.converts_from(ImageFormatKind::Jpeg));
        assert!(!s.converts_from(ImageFormatKind::Png));
        assert!(s.converts_from(ImageFormatKind::Tiff));
        assert!(!s.converts_from(ImageFormatKind::Webp));
        assert!(!s.converts_from(ImageFormatKind::Avif));
    }

    #[test]
    fn encode_options_follow_format_options() {
        let mut s = Settings::default();
        s.format_options.avif.quality = 55;
        assert_eq!(
            s.encode_options(ImageFormatKind::Avif),
            EncodeOptions::Avif(AvifOptions {
                quality: 55,
                effort: 4
            })
        );
        assert_eq!(s.encode_options(ImageFormatKind::Tiff), EncodeOptions::Tiff);
        assert_eq!(
            s.encode_options(ImageFormatKind::Webp).quality(),
            Some(Quality::new(100))
        );
    }

    #[test]
    fn service_reads_written_settings() {
        let service = SettingsService::new(Arc::new(MemoryStore::new()));
        assert_eq!(service.settings(), Settings::default());

        let updated = Settings {
            convert_to: ConvertTo::Avif,
            ..Settings::default()
        };
        service.update(&updated).unwrap();
        assert_eq!(service.settings(), updated);
    }

    #[test]
    fn update_from_rejects_without_persisting() {
        let store = Arc::new(MemoryStore::new());
        let service = SettingsService::new(store.clone());
        assert!(service.update_from(&json!({"autoOrientation": "no"})).is_err());
        assert_eq!(store.get(NAMESPACE, SETTINGS_KEY).unwrap(), None);
    }

    #[test]
    fn bootstrap_fills_missing_keys_and_keeps_stored_values() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(
                NAMESPACE,
                SETTINGS_KEY,
                json!({"convertTo": "avif", "formatOptions": {"avif": {"quality": 50}}}),
            )
            .unwrap();

        let service = SettingsService::new(store.clone());
        let settings = service.bootstrap().unwrap();
        assert_eq!(settings.convert_to, ConvertTo::Avif);
        assert_eq!(settings.format_options.avif.quality, 50);
        assert_eq!(settings.format_options.avif.effort, 4);

        let stored = store.get(NAMESPACE, SETTINGS_KEY).unwrap().unwrap();
        assert_eq!(stored["convertFromJPEG"], json!(true));
        assert_eq!(stored["formatOptions"]["avif"]["effort"], json!(4));
    }

    #[test]
    fn bootstrap_on_empty_store_writes_defaults() {
        let store = Arc::new(MemoryStore::new());
        let service = SettingsService::new(store.clone());
        assert_eq!(service.bootstrap().unwrap(), Settings::default());
        assert_eq!(
            store.get(NAMESPACE, SETTINGS_KEY).unwrap(),
            Some(serde_json::to_value(Settings::default()).unwrap())
        );
    }

    struct BrokenStore;

    impl SettingsStore for BrokenStore {
        fn get(&self, _: &str, _: &str) -> Result<Option<Value>, StoreError> {
            Err(StoreError::Io(std::io::Error::other("disk gone")))
        }
        fn set(&self, _: &str, _: &str, _: Value) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::other("disk gone")))
        }
    }

    #[test]
    fn bootstrap_recovers_from_a_corrupt_store_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join(STORE_FILENAME), "{ truncated").unwrap();
        let service = SettingsService::new(Arc::new(JsonFileStore::open(tmp.path())));

        assert_eq!(service.bootstrap().unwrap(), Settings::default());
        assert_eq!(service.settings(), Settings::default());

        // The store is readable again, so updates go through.
        let updated = service.update_from(&json!({"convertTo": "avif"})).unwrap();
        assert_eq!(updated.convert_to, ConvertTo::Avif);
        assert_eq!(service.settings().convert_to, ConvertTo::Avif);
    }

    #[test]
    fn store_failure_degrades_to_defaults() {
        let service = SettingsService::new(Arc::new(BrokenStore));
        assert_eq!(service.settings(), Settings::default());
        assert!(service.update(&Settings::default()).is_err());
    }
}
