//! Proxy configuration module.
//!
//! Handles loading, validating, and merging `config.toml`. Stock defaults
//! are overridden by the user file, key by key.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! base_url = ""                 # Prefix for relative source URLs
//! strict_options = true         # Reject unknown option names
//! max_animation_frames = 1      # Frames decoded from animated sources
//!
//! [processing]
//! quality = 80                  # Default output quality (0-100)
//! auto_rotate = true            # Apply EXIF orientation
//! strip_metadata = true         # Drop embedded metadata on output
//! keep_copyright = true         # ...but keep IPTC/XMP/EXIF attribution
//! strip_color_profile = true    # Drop the ICC profile on output
//!
//! [format]
//! enable_webp_detection = false # Prefer WebP when Accept allows it
//! enforce_webp = false          # ...even over the source format
//! enable_avif_detection = false
//! enforce_avif = false
//! enable_client_hints = false   # Honour DPR / Width client hints
//!
//! [watermark]
//! opacity = 1.0                 # Ceiling multiplied into every request's opacity
//! # path = "watermark.png"      # Watermark image, relative to the config dir
//!
//! [presets]
//! # thumb = "resize:fill:200:200/quality:70"
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse, override just the values you want:
//!
//! ```toml
//! [format]
//! enforce_webp = true
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Proxy configuration loaded from `config.toml`.
///
/// All fields have sensible defaults. User config files need only specify
/// the values they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyConfig {
    /// Prepended to decoded source URLs that don't already start with it.
    pub base_url: String,
    /// Fail requests that name an unknown option instead of ignoring it.
    pub strict_options: bool,
    /// Upper bound on frames decoded from animated sources.
    pub max_animation_frames: u32,
    pub processing: ProcessingConfig,
    pub format: FormatConfig,
    pub watermark: WatermarkConfig,
    /// Named option lists, `name = "opt:arg/opt:arg"`.
    pub presets: BTreeMap<String, String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            strict_options: true,
            max_animation_frames: 1,
            processing: ProcessingConfig::default(),
            format: FormatConfig::default(),
            watermark: WatermarkConfig::default(),
            presets: BTreeMap::new(),
        }
    }
}

impl ProxyConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processing.quality > 100 {
            return Err(ConfigError::Validation(
                "processing.quality must be 0-100".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.watermark.opacity) {
            return Err(ConfigError::Validation(
                "watermark.opacity must be between 0 and 1".into(),
            ));
        }
        if self.max_animation_frames == 0 {
            return Err(ConfigError::Validation(
                "max_animation_frames must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Defaults for every request's processing options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Output encoding quality (0 = worst, 100 = best).
    pub quality: u32,
    pub auto_rotate: bool,
    pub strip_metadata: bool,
    pub keep_copyright: bool,
    pub strip_color_profile: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            quality: 80,
            auto_rotate: true,
            strip_metadata: true,
            keep_copyright: true,
            strip_color_profile: true,
        }
    }
}

/// Output format negotiation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FormatConfig {
    pub enable_webp_detection: bool,
    pub enforce_webp: bool,
    pub enable_avif_detection: bool,
    pub enforce_avif: bool,
    pub enable_client_hints: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatermarkConfig {
    /// Multiplied into every request's watermark opacity.
    pub opacity: f64,
    /// Watermark image file. Relative paths resolve against the config dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            path: None,
        }
    }
}

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(ProxyConfig::default())?)
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

/// Load a `config.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if no `config.toml` exists in the directory.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = path.join("config.toml");
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<ProxyConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: ProxyConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `config.toml` in the given directory.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(root: &Path) -> Result<ProxyConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(root)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# imgpipe Configuration
# =====================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# Prefix prepended to decoded source URLs that don't already start with it.
# Plain string concatenation, no URL normalization.
base_url = ""

# Reject requests naming an unknown option. When false, unknown options
# are logged and ignored.
strict_options = true

# Maximum number of frames decoded from animated GIF/WebP sources.
# 1 keeps only the first frame.
max_animation_frames = 1

# ---------------------------------------------------------------------------
# Per-request defaults
# ---------------------------------------------------------------------------
[processing]
# Output quality for lossy formats (0-100).
quality = 80

# Rotate according to EXIF orientation.
auto_rotate = true

# Strip embedded metadata from the output.
strip_metadata = true

# When stripping, keep creator/credit/copyright IPTC, the dc/xmpRights/cc
# XMP properties, and EXIF Artist/Copyright.
keep_copyright = true

# Drop the ICC colour profile from the output.
strip_color_profile = true

# ---------------------------------------------------------------------------
# Output format negotiation (from the Accept header)
# ---------------------------------------------------------------------------
[format]
# Use WebP when the client accepts it and no format was requested.
enable_webp_detection = false

# Use WebP whenever the client accepts it, even over the source format.
enforce_webp = false

# Same as above, for AVIF. AVIF wins over WebP when both apply.
enable_avif_detection = false
enforce_avif = false

# Honour DPR / Sec-CH-DPR and Width / Sec-CH-Width client hints.
enable_client_hints = false

# ---------------------------------------------------------------------------
# Watermark
# ---------------------------------------------------------------------------
[watermark]
# Opacity ceiling (0-1), multiplied into every request's watermark opacity.
opacity = 1.0

# Watermark image. Relative paths resolve against the config directory.
# path = "watermark.png"

# ---------------------------------------------------------------------------
# Presets
# ---------------------------------------------------------------------------
# Named option lists usable as `preset=name`. A preset called "default"
# is applied to every request before its own options.
[presets]
# thumb = "resize:fill:200:200/quality:70"
"##
}
