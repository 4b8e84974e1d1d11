//! Camera RAW development.
//!
//! `rawloader` reads the sensor data; this module turns it into an RGB frame:
//!
//! 1. Normalize by the decoder's black and white levels (0.0 = black,
//!    1.0 = sensor saturation).
//! 2. Bilinear demosaic for 2×2 Bayer layouts. Three-component sensors are
//!    used as-is, monochrome sensors are replicated into all channels.
//! 3. Optional camera white balance (coefficients normalized to green).
//! 4. Optional automatic brightness: scale so the 99th percentile reaches
//!    full scale.
//! 5. Clip highlights to 1.0. Blown highlights are never reconstructed, so a
//!    saturated star core is pure white in every frame.
//! 6. BT.709 transfer curve, scaled to 0–255.

use super::frame::{Frame, FrameShape};
use super::params::RawOptions;
use super::source::DecodeError;
use rayon::prelude::*;
use std::path::Path;

/// Fraction of samples allowed to saturate under automatic brightness.
const AUTO_BRIGHT_CLIP_FRACTION: f32 = 0.01;

/// Bayer CFA layout, named by the 2×2 tile read row by row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CfaPattern {
    Rggb,
    Bggr,
    Grbg,
    Gbrg,
}

impl CfaPattern {
    /// Color at `(row, col)`: 0 = red, 1 = green, 2 = blue.
    #[inline]
    pub fn color_at(self, row: usize, col: usize) -> usize {
        let tile = match self {
            CfaPattern::Rggb => [[0, 1], [1, 2]],
            CfaPattern::Bggr => [[2, 1], [1, 0]],
            CfaPattern::Grbg => [[1, 0], [2, 1]],
            CfaPattern::Gbrg => [[1, 2], [0, 1]],
        };
        tile[row % 2][col % 2]
    }

    /// Recognize a pattern from the colors of its 2×2 tile.
    ///
    /// Color index 3 (second green in four-color descriptions) counts as green.
    pub fn from_tile(tile: [[usize; 2]; 2]) -> Option<Self> {
        let norm = |c: usize| if c == 3 { 1 } else { c };
        let tile = [
            [norm(tile[0][0]), norm(tile[0][1])],
            [norm(tile[1][0]), norm(tile[1][1])],
        ];
        [
            CfaPattern::Rggb,
            CfaPattern::Bggr,
            CfaPattern::Grbg,
            CfaPattern::Gbrg,
        ]
        .into_iter()
        .find(|p| {
            (0..2).all(|r| (0..2).all(|c| p.color_at(r, c) == tile[r][c]))
        })
    }
}

/// How sensor samples map to color channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorLayout {
    Bayer(CfaPattern),
    /// Three interleaved components per pixel.
    Rgb,
    Monochrome,
}

/// Normalized sensor readout, independent of the RAW decoder.
#[derive(Debug, Clone)]
pub struct SensorData {
    pub width: usize,
    pub height: usize,
    pub layout: SensorLayout,
    /// 0.0 = black level, 1.0 = white level. Not clipped.
    pub samples: Vec<f32>,
    /// Camera white balance gains `[r, g, b]`, green normalized to 1.0.
    pub wb_gains: [f32; 3],
}

impl SensorData {
    /// Read a RAW file through `rawloader`.
    pub fn load(path: &Path) -> Result<Self, DecodeError> {
        let raw = rawloader::decode_file(path).map_err(|e| DecodeError::Raw(e.to_string()))?;

        let layout = if raw.cpp == 3 {
            SensorLayout::Rgb
        } else if raw.cpp != 1 {
            return Err(DecodeError::UnsupportedRaw(format!(
                "{} components per pixel",
                raw.cpp
            )));
        } else if raw.cfa.width == 0 || raw.cfa.height == 0 {
            SensorLayout::Monochrome
        } else if raw.cfa.width == 2 && raw.cfa.height == 2 {
            let tile = [
                [raw.cfa.color_at(0, 0), raw.cfa.color_at(0, 1)],
                [raw.cfa.color_at(1, 0), raw.cfa.color_at(1, 1)],
            ];
            SensorLayout::Bayer(CfaPattern::from_tile(tile).ok_or_else(|| {
                DecodeError::UnsupportedRaw(format!("CFA pattern {}", raw.cfa.name))
            })?)
        } else {
            // X-Trans and other large-tile sensors
            return Err(DecodeError::UnsupportedRaw(format!(
                "CFA pattern {} ({}x{} tile)",
                raw.cfa.name, raw.cfa.width, raw.cfa.height
            )));
        };

        let black = f32::from(raw.blacklevels[0]);
        let white = f32::from(raw.whitelevels[0]);
        let samples = match &raw.data {
            rawloader::RawImageData::Integer(data) => {
                normalize(data.iter().map(|&v| f32::from(v)), black, white)?
            }
            rawloader::RawImageData::Float(data) => {
                normalize(data.iter().copied(), black, white)?
            }
        };

        let sensor = SensorData {
            width: raw.width,
            height: raw.height,
            layout,
            samples,
            wb_gains: wb_gains(raw.wb_coeffs),
        };
        let expected = sensor.width * sensor.height * sensor.components();
        if sensor.samples.len() != expected {
            return Err(DecodeError::Raw(format!(
                "expected {expected} samples, decoder returned {}",
                sensor.samples.len()
            )));
        }
        Ok(sensor)
    }

    fn components(&self) -> usize {
        match self.layout {
            SensorLayout::Rgb => 3,
            SensorLayout::Bayer(_) | SensorLayout::Monochrome => 1,
        }
    }

    pub fn shape(&self) -> FrameShape {
        FrameShape::rgb(self.width as u32, self.height as u32)
    }

    /// Develop into an RGB frame on the 0–255 scale.
    pub fn develop(&self, options: &RawOptions) -> Frame<f32> {
        let mut rgb = match self.layout {
            SensorLayout::Bayer(cfa) => {
                demosaic_bilinear(&self.samples, self.width, self.height, cfa)
            }
            SensorLayout::Rgb => self.samples.clone(),
            SensorLayout::Monochrome => self.samples.iter().flat_map(|&v| [v; 3]).collect(),
        };

        if options.use_camera_wb && self.layout != SensorLayout::Monochrome {
            rgb.par_chunks_mut(3).for_each(|px| {
                for (v, gain) in px.iter_mut().zip(self.wb_gains) {
                    *v *= gain;
                }
            });
        }

        if !options.no_auto_bright {
            if let Some(scale) = auto_bright_scale(&rgb) {
                rgb.par_iter_mut().for_each(|v| *v *= scale);
            }
        }

        rgb.par_iter_mut()
            .for_each(|v| *v = bt709_encode(v.clamp(0.0, 1.0)) * 255.0);

        // Length is width * height * 3 by construction
        Frame::from_samples(self.shape(), rgb).unwrap_or_else(|_| Frame::zeros(self.shape()))
    }
}

/// Decode and develop a RAW file.
pub fn decode_raw(path: &Path, options: &RawOptions) -> Result<Frame<f32>, DecodeError> {
    let sensor = SensorData::load(path)?;
    log::debug!(
        "RAW {}: {}x{} {:?}, wb {:?}",
        path.display(),
        sensor.width,
        sensor.height,
        sensor.layout,
        sensor.wb_gains
    );
    Ok(sensor.develop(options))
}

fn normalize(
    values: impl Iterator<Item = f32>,
    black: f32,
    white: f32,
) -> Result<Vec<f32>, DecodeError> {
    let range = white - black;
    if range <= 0.0 {
        return Err(DecodeError::Raw(format!(
            "white level {white} is not above black level {black}"
        )));
    }
    Ok(values.map(|v| (v - black) / range).collect())
}

/// Green-normalized gains from the decoder's coefficients; unit gains when
/// the camera did not record usable ones.
fn wb_gains(coeffs: [f32; 4]) -> [f32; 3] {
    let [r, g, b, _] = coeffs;
    if [r, g, b].iter().all(|c| c.is_finite() && *c > 0.0) {
        [r / g, 1.0, b / g]
    } else {
        [1.0, 1.0, 1.0]
    }
}

/// Scale factor that maps the 99th percentile to 1.0, if it is positive.
fn auto_bright_scale(samples: &[f32]) -> Option<f32> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted = samples.to_vec();
    let rank = ((sorted.len() as f32) * (1.0 - AUTO_BRIGHT_CLIP_FRACTION)) as usize;
    let rank = rank.min(sorted.len() - 1);
    let (_, pivot, _) = sorted.select_nth_unstable_by(rank, f32::total_cmp);
    let pivot = *pivot;
    (pivot.is_finite() && pivot > 0.0).then(|| 1.0 / pivot)
}

/// BT.709 transfer function (power 0.45, linear toe with slope 4.5).
#[inline]
fn bt709_encode(linear: f32) -> f32 {
    if linear < 0.018 {
        4.5 * linear
    } else {
        1.099 * linear.powf(0.45) - 0.099
    }
}

/// Bilinear demosaic: each missing channel is the mean of the same-color
/// samples in the surrounding 3×3 window.
pub fn demosaic_bilinear(data: &[f32], width: usize, height: usize, cfa: CfaPattern) -> Vec<f32> {
    let mut rgb = vec![0.0f32; width * height * 3];
    if width == 0 {
        return rgb;
    }

    rgb.par_chunks_mut(width * 3)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width {
                let own = cfa.color_at(y, x);
                let mut sum = [0.0f32; 3];
                let mut count = [0u32; 3];

                for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
                    for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                        let c = cfa.color_at(ny, nx);
                        sum[c] += data[ny * width + nx];
                        count[c] += 1;
                    }
                }

                for c in 0..3 {
                    row[x * 3 + c] = if c == own {
                        data[y * width + x]
                    } else if count[c] > 0 {
                        sum[c] / count[c] as f32
                    } else {
                        0.0
                    };
                }
            }
        });

    rgb
}
