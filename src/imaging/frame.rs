//! Decoded pixel buffers.
//!
//! A [`Frame`] is an interleaved, row-major buffer of `width × height ×
//! channels` samples. Three-channel frames are always **RGB** order; single
//! channel frames are luma. Two sample types are used throughout the crate:
//!
//! | Type | Role | Range |
//! |---|---|---|
//! | `Frame<u8>` | on-disk representation, previews, final result | 0–255 |
//! | `Frame<f32>` | decoded sources and the running accumulator | 0.0–255.0 |
//!
//! The wide type keeps the 8-bit scale rather than normalizing to 0–1, so
//! every 8-bit input value is represented exactly and [`Frame::narrow`] is a
//! plain clamp-and-truncate.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum FrameError {
    #[error("Unsupported channel count {0} (expected 1 or 3)")]
    UnsupportedChannels(u8),
    #[error("Sample buffer has {actual} samples, shape {shape} needs {expected}")]
    LengthMismatch {
        shape: FrameShape,
        expected: usize,
        actual: usize,
    },
    #[error("Cannot resize to an empty shape ({width}x{height})")]
    EmptyTarget { width: u32, height: u32 },
}

/// Width, height and channel count of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameShape {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

/// Shape of the zero-filled frame substituted for undecodable sources until a
/// reference shape has been recorded.
pub const DEFAULT_FALLBACK_SHAPE: FrameShape = FrameShape::rgb(1920, 1080);

impl FrameShape {
    pub const fn new(width: u32, height: u32, channels: u8) -> Self {
        Self {
            width,
            height,
            channels,
        }
    }

    pub const fn rgb(width: u32, height: u32) -> Self {
        Self::new(width, height, 3)
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn sample_count(&self) -> usize {
        self.pixel_count() * self.channels as usize
    }
}

impl fmt::Display for FrameShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.channels)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame<T> {
    shape: FrameShape,
    samples: Vec<T>,
}

impl<T: Copy + Default> Frame<T> {
    /// Wrap an interleaved sample buffer, checking it against `shape`.
    pub fn from_samples(shape: FrameShape, samples: Vec<T>) -> Result<Self, FrameError> {
        if !matches!(shape.channels, 1 | 3) {
            return Err(FrameError::UnsupportedChannels(shape.channels));
        }
        if samples.len() != shape.sample_count() {
            return Err(FrameError::LengthMismatch {
                shape,
                expected: shape.sample_count(),
                actual: samples.len(),
            });
        }
        Ok(Self { shape, samples })
    }

    /// A frame with every sample set to the type's zero.
    pub fn zeros(shape: FrameShape) -> Self {
        Self {
            shape,
            samples: vec![T::default(); shape.sample_count()],
        }
    }

    pub fn shape(&self) -> FrameShape {
        self.shape
    }

    pub fn width(&self) -> u32 {
        self.shape.width
    }

    pub fn height(&self) -> u32 {
        self.shape.height
    }

    pub fn channels(&self) -> u8 {
        self.shape.channels
    }

    pub fn samples(&self) -> &[T] {
        &self.samples
    }

    pub(crate) fn samples_mut(&mut self) -> &mut [T] {
        &mut self.samples
    }

    /// Sample at column `x`, row `y`, channel `c`.
    pub fn sample(&self, x: u32, y: u32, c: u8) -> T {
        let idx = (y as usize * self.shape.width as usize + x as usize)
            * self.shape.channels as usize
            + c as usize;
        self.samples[idx]
    }
}

impl Frame<u8> {
    /// Promote to the accumulation type. Lossless.
    pub fn widen(&self) -> Frame<f32> {
        Frame {
            shape: self.shape,
            samples: self.samples.iter().map(|&v| f32::from(v)).collect(),
        }
    }

    /// Convert to an `image` crate buffer for encoding.
    pub fn to_dynamic_image(&self) -> Result<DynamicImage, FrameError> {
        let FrameShape {
            width,
            height,
            channels,
        } = self.shape;
        let length_error = || FrameError::LengthMismatch {
            shape: self.shape,
            expected: self.shape.sample_count(),
            actual: self.samples.len(),
        };
        match channels {
            3 => RgbImage::from_raw(width, height, self.samples.clone())
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(length_error),
            1 => GrayImage::from_raw(width, height, self.samples.clone())
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(length_error),
            other => Err(FrameError::UnsupportedChannels(other)),
        }
    }
}

impl From<RgbImage> for Frame<f32> {
    fn from(img: RgbImage) -> Self {
        let shape = FrameShape::rgb(img.width(), img.height());
        Frame {
            shape,
            samples: img.into_raw().into_iter().map(f32::from).collect(),
        }
    }
}

impl Frame<f32> {
    /// Narrow to 8-bit: clamp to [0, 255], then truncate.
    pub fn narrow(&self) -> Frame<u8> {
        Frame {
            shape: self.shape,
            samples: self.samples.iter().map(|&v| narrow_sample(v)).collect(),
        }
    }

    /// Resample to `width × height` with a Lanczos3 filter, keeping channels.
    pub fn resized(&self, width: u32, height: u32) -> Result<Frame<f32>, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::EmptyTarget { width, height });
        }
        if width == self.shape.width && height == self.shape.height {
            return Ok(self.clone());
        }

        // The resampler clamps float samples to [0, 1], so work in that range.
        let unit: Vec<f32> = self.samples.iter().map(|v| v / 255.0).collect();
        let (w, h) = (self.shape.width, self.shape.height);
        let length_error = || FrameError::LengthMismatch {
            shape: self.shape,
            expected: self.shape.sample_count(),
            actual: self.samples.len(),
        };
        let resized = match self.shape.channels {
            3 => {
                let buf = ImageBuffer::<Rgb<f32>, Vec<f32>>::from_raw(w, h, unit)
                    .ok_or_else(length_error)?;
                image::imageops::resize(&buf, width, height, FilterType::Lanczos3).into_raw()
            }
            1 => {
                let buf = ImageBuffer::<Luma<f32>, Vec<f32>>::from_raw(w, h, unit)
                    .ok_or_else(length_error)?;
                image::imageops::resize(&buf, width, height, FilterType::Lanczos3).into_raw()
            }
            other => return Err(FrameError::UnsupportedChannels(other)),
        };

        Ok(Frame {
            shape: FrameShape::new(width, height, self.shape.channels),
            samples: resized.into_iter().map(|v| v * 255.0).collect(),
        })
    }
}

#[inline]
fn narrow_sample(v: f32) -> u8 {
    // `as` saturates and maps NaN to 0
    v.clamp(0.0, 255.0) as u8
}
