//! Run configuration.
//!
//! Handles loading, validating, and merging `star-trail.toml`. Stock
//! defaults are the base layer; a config file overrides any subset of keys,
//! and command-line flags override the file.
//!
//! ## Config File Location
//!
//! 1. `--config FILE` when given (the file must exist)
//! 2. `star-trail.toml` inside the input directory, if present
//! 3. stock defaults
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [raw]
//! use_camera_wb = true      # Apply the camera's recorded white balance
//! no_auto_bright = true     # Keep sensor brightness as recorded
//!
//! [output]
//! image = "star_trail.jpg"  # Stacked image file name (.jpg, .png, .tif)
//! size_policy = "first"     # first | smallest | largest
//! jpeg_quality = 95         # 1-100
//!
//! [gif]
//! enabled = true
//! filename = "star_trail_timelapse.gif"
//! frame_duration_ms = 50    # 10-1000
//! # max_edge = 800          # Downscale so the longer edge fits
//!
//! [preview]
//! every = 10                # Preview cadence in frames (0 = only at the end)
//!
//! [processing]
//! # max_threads = 4         # Omit for auto = CPU cores
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{RawOptions, SizePolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name looked up in the input directory.
pub const CONFIG_FILE_NAME: &str = "star-trail.toml";

/// Extensions the stacked image may be written as.
pub const IMAGE_OUTPUT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StackConfig {
    /// Camera RAW development switches.
    pub raw: RawOptions,
    /// Stacked image settings.
    pub output: OutputConfig,
    /// Timelapse settings.
    pub gif: GifConfig,
    pub preview: PreviewConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// File name of the stacked image inside the output directory.
    pub image: String,
    pub size_policy: SizePolicy,
    /// JPEG encoding quality (1 = worst, 100 = best).
    pub jpeg_quality: u8,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            image: "star_trail.jpg".to_string(),
            size_policy: SizePolicy::First,
            jpeg_quality: 95,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GifConfig {
    pub enabled: bool,
    /// File name of the timelapse inside the output directory.
    pub filename: String,
    /// How long each frame is shown.
    pub frame_duration_ms: u64,
    /// Longest edge of the timelapse in pixels. When absent the timelapse
    /// keeps the stacked image's size.
    pub max_edge: Option<u32>,
}

impl Default for GifConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            filename: "star_trail_timelapse.gif".to_string(),
            frame_duration_ms: 50,
            max_edge: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreviewConfig {
    /// Emit a preview every N frames. The final image is always previewed.
    pub every: usize,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self { every: 10 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of threads used inside each fold and resample.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_threads: Option<usize>,
}

impl StackConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.output.jpeg_quality) {
            return Err(ConfigError::Validation(
                "output.jpeg_quality must be 1-100".into(),
            ));
        }
        if !has_extension(&self.output.image, IMAGE_OUTPUT_EXTENSIONS) {
            return Err(ConfigError::Validation(format!(
                "output.image must end in one of .{} (got '{}')",
                IMAGE_OUTPUT_EXTENSIONS.join(", ."),
                self.output.image
            )));
        }
        if self.gif.enabled && !has_extension(&self.gif.filename, &["gif"]) {
            return Err(ConfigError::Validation(format!(
                "gif.filename must end in .gif (got '{}')",
                self.gif.filename
            )));
        }
        if !(10..=1000).contains(&self.gif.frame_duration_ms) {
            return Err(ConfigError::Validation(
                "gif.frame_duration_ms must be 10-1000".into(),
            ));
        }
        if self.gif.max_edge == Some(0) {
            return Err(ConfigError::Validation(
                "gif.max_edge must be greater than 0".into(),
            ));
        }
        if self.processing.max_threads == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_threads must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn has_extension(name: &str, allowed: &[&str]) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| allowed.iter().any(|a| a.eq_ignore_ascii_case(e)))
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_threads.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(StackConfig::default())?)
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

/// Parse a config file as a raw TOML value.
pub fn load_raw_config(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Merge an optional overlay onto the stock defaults and deserialize.
///
/// Range checks are left to [`StackConfig::validate`], which callers run once
/// every override is in place.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<StackConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    Ok(merged.try_into()?)
}

/// The config file that applies to a run over `input_dir`, if any.
pub fn config_path(explicit: Option<&Path>, input_dir: &Path) -> Result<Option<PathBuf>, ConfigError> {
    match explicit {
        Some(path) if path.is_file() => Ok(Some(path.to_path_buf())),
        Some(path) => Err(ConfigError::NotFound(path.to_path_buf())),
        None => {
            let candidate = input_dir.join(CONFIG_FILE_NAME);
            Ok(candidate.is_file().then_some(candidate))
        }
    }
}

/// Load the configuration for a run over `input_dir`.
///
/// Merges user values on top of stock defaults and rejects unknown keys.
/// The result is not validated yet.
pub fn load_config(explicit: Option<&Path>, input_dir: &Path) -> Result<StackConfig, ConfigError> {
    let overlay = match config_path(explicit, input_dir)? {
        Some(path) => {
            log::info!("Using config {}", path.display());
            Some(load_raw_config(&path)?)
        }
        None => None,
    };
    resolve_config(overlay)
}

/// Returns a fully-commented stock `star-trail.toml` with all keys and
/// explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Star Trail Configuration
# ========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# The file is picked up from the input directory as star-trail.toml,
# or passed explicitly with --config. Command-line flags override it.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Camera RAW development (.cr2)
# ---------------------------------------------------------------------------
[raw]
# Multiply channels by the white balance the camera recorded.
# false = unit gains (the sensor's native color).
use_camera_wb = true

# Skip automatic brightness. When false, each frame is scaled so its
# 99th percentile reaches full scale, which changes from frame to frame.
# Highlights are always clipped.
no_auto_bright = true

# ---------------------------------------------------------------------------
# Stacked image
# ---------------------------------------------------------------------------
[output]
# File name inside the output directory. The extension picks the format:
# .jpg/.jpeg, .png, .tif/.tiff
image = "star_trail.jpg"

# What to do when frames differ in size:
#   first    - stack at the first frame's size; other sizes are an error
#   smallest - resample every frame to the smallest one
#   largest  - resample every frame to the largest one
size_policy = "first"

# JPEG quality (1-100). Ignored for PNG and TIFF.
jpeg_quality = 95

# ---------------------------------------------------------------------------
# Timelapse
# ---------------------------------------------------------------------------
[gif]
# Also write an animated GIF of the original frames.
enabled = true

# File name inside the output directory.
filename = "star_trail_timelapse.gif"

# Display time per frame in milliseconds (10-1000).
frame_duration_ms = 50

# Downscale the animation so its longer edge is at most this many pixels.
# Omit to keep the stacked image's size.
# max_edge = 800

# ---------------------------------------------------------------------------
# Previews
# ---------------------------------------------------------------------------
[preview]
# Emit an intermediate preview every N frames (0 = only the final image).
every = 10

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum threads used inside each frame fold and resample.
# Omit to use all CPU cores. Values above the core count are clamped.
# max_threads = 4
"##
}
