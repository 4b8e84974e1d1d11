//! Parameter types for decoding and stacking.
//!
//! These describe *what* to do, not *how*. [`RawOptions`] is handed to the
//! RAW developer, [`SizePolicy`] tells the stack driver how to pick the
//! reference frame shape.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Caller-supplied switches for camera RAW development.
///
/// Highlight handling is not configurable: values above the sensor's white
/// point are always clipped so star cores develop identically in every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawOptions {
    /// Apply the white balance recorded by the camera instead of unit gains.
    pub use_camera_wb: bool,
    /// Skip automatic brightness normalization.
    pub no_auto_bright: bool,
}

impl Default for RawOptions {
    fn default() -> Self {
        Self {
            use_camera_wb: true,
            no_auto_bright: true,
        }
    }
}

/// How the accumulator's shape is chosen when input frames differ in size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizePolicy {
    /// Use the first frame's shape; any other shape is an error.
    #[default]
    First,
    /// Use the smallest frame (by pixel area) and resample the others.
    Smallest,
    /// Use the largest frame (by pixel area) and resample the others.
    Largest,
}

impl SizePolicy {
    /// Whether frames that differ from the reference are resampled.
    pub fn resamples(self) -> bool {
        !matches!(self, SizePolicy::First)
    }
}

impl fmt::Display for SizePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SizePolicy::First => "first",
            SizePolicy::Smallest => "smallest",
            SizePolicy::Largest => "largest",
        })
    }
}

impl FromStr for SizePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "first" => Ok(SizePolicy::First),
            "smallest" => Ok(SizePolicy::Smallest),
            "largest" => Ok(SizePolicy::Largest),
            other => Err(format!(
                "unknown size policy '{other}' (expected first, smallest or largest)"
            )),
        }
    }
}
