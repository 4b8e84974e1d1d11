//! Shared test utilities for the star-trail test suite.
//!
//! Synthetic frames, tiny on-disk images, and an observer that records every
//! event so tests can assert on what a run reported.
//!
//! # Usage
//!
//! ```rust,ignore
//! use crate::test_helpers::*;
//!
//! let seq = paths(&["/night/1.png", "/night/2.png"]);
//! let source = MockSource::new()
//!     .with_frame(&seq[0], luma_frame(1, 1, &[10.0]))
//!     .with_frame(&seq[1], luma_frame(1, 1, &[200.0]));
//!
//! let mut observer = RecordingObserver::default();
//! let result = stack(&seq, &source, &StackOptions::default(), &mut observer, &CancelToken::new())?;
//! assert_eq!(observer.progress().len(), 2);
//! ```

use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::{GrayImage, ImageFormat, Luma, Rgb, RgbImage};

use crate::imaging::{Frame, FrameShape};
use crate::progress::{Progress, StackEvent, StackObserver};

// =========================================================================
// Frames
// =========================================================================

/// A frame with every sample set to `value`.
pub fn flat_frame(shape: FrameShape, value: f32) -> Frame<f32> {
    Frame::from_samples(shape, vec![value; shape.sample_count()]).unwrap()
}

/// A single-channel frame from row-major samples.
pub fn luma_frame(width: u32, height: u32, samples: &[f32]) -> Frame<f32> {
    Frame::from_samples(FrameShape::new(width, height, 1), samples.to_vec()).unwrap()
}

pub fn paths(names: &[&str]) -> Vec<PathBuf> {
    names.iter().map(PathBuf::from).collect()
}

// =========================================================================
// Files on disk
// =========================================================================

/// Write an RGB PNG whose pixels come from `pixel(x, y)`.
/// PNG content whatever the extension of `path`.
pub fn write_rgb_png(path: &Path, width: u32, height: u32, pixel: impl Fn(u32, u32) -> [u8; 3]) {
    RgbImage::from_fn(width, height, |x, y| Rgb(pixel(x, y)))
        .save_with_format(path, ImageFormat::Png)
        .unwrap();
}

pub fn write_gray_png(path: &Path, width: u32, height: u32, value: u8) {
    GrayImage::from_pixel(width, height, Luma([value]))
        .save(path)
        .unwrap();
}

/// Write a gradient JPEG at quality 90.
pub fn write_rgb_jpeg(path: &Path, width: u32, height: u32) {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 255 / width.max(1)) as u8, (y * 255 / height.max(1)) as u8, 128])
    });
    let file = std::fs::File::create(path).unwrap();
    img.write_with_encoder(JpegEncoder::new_with_quality(file, 90))
        .unwrap();
}

/// Write a sequence of flat-colored PNGs named `frame_000.png`, `frame_001.png`, ...
/// and return their paths in order.
pub fn write_png_sequence(dir: &Path, width: u32, height: u32, values: &[u8]) -> Vec<PathBuf> {
    values
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let path = dir.join(format!("frame_{i:03}.png"));
            write_rgb_png(&path, width, height, |_, _| [value, value, value]);
            path
        })
        .collect()
}

// =========================================================================
// Observer
// =========================================================================

/// Keeps every event in arrival order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub events: Vec<StackEvent>,
}

impl RecordingObserver {
    pub fn progress(&self) -> Vec<Progress> {
        self.events
            .iter()
            .filter_map(|e| match e {
                StackEvent::Progress(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    pub fn previews(&self) -> Vec<Frame<u8>> {
        self.events
            .iter()
            .filter_map(|e| match e {
                StackEvent::Preview(frame) => Some(frame.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                StackEvent::Warning(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn fatals(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                StackEvent::Fatal(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn completed(&self) -> Option<Vec<PathBuf>> {
        self.events.iter().find_map(|e| match e {
            StackEvent::Complete(artifacts) => Some(artifacts.clone()),
            _ => None,
        })
    }
}

impl StackObserver for RecordingObserver {
    fn on_stage(&mut self, stage: crate::progress::Stage) {
        self.events.push(StackEvent::Stage(stage));
    }

    fn on_progress(&mut self, progress: Progress) {
        self.events.push(StackEvent::Progress(progress));
    }

    fn on_preview(&mut self, preview: &Frame<u8>) {
        self.events.push(StackEvent::Preview(preview.clone()));
    }

    fn on_warning(&mut self, message: &str) {
        self.events.push(StackEvent::Warning(message.to_string()));
    }

    fn on_complete(&mut self, artifacts: &[PathBuf]) {
        self.events.push(StackEvent::Complete(artifacts.to_vec()));
    }

    fn on_fatal(&mut self, message: &str) {
        self.events.push(StackEvent::Fatal(message.to_string()));
    }
}
