//! Production image source built on pure Rust decoders.
//!
//! | Input | Crate / function |
//! |---|---|
//! | JPEG, PNG, TIFF | `image::ImageReader` → RGB8 → `f32` |
//! | Camera RAW (`.cr2`) | `rawloader` readout + [`raw`](super::raw) development |
//! | Identify (raster) | `ImageReader` header read, format sniffed from content |
//! | Identify (RAW) | full `rawloader` readout (no header-only path) |
//!
//! Identify and decode both sniff the raster format from the file content, so
//! a PNG saved as `.jpg` reports the same shape it decodes to.
//!
//! `rawloader` has no header-only mode, so identifying a CR2 costs a full
//! sensor readout. Under the `smallest` and `largest` size policies every RAW
//! file is therefore read once to identify, once to stack and once more for
//! the GIF. The `first` policy identifies only the first readable file.

use super::frame::{Frame, FrameShape};
use super::params::RawOptions;
use super::raw::{SensorData, decode_raw};
use super::source::{DecodeError, ImageSource, SourceKind, source_kind};
use image::ImageReader;
use std::path::Path;

/// Decodes raster formats with the `image` crate and RAW files with
/// `rawloader`, using the given [`RawOptions`] for development.
#[derive(Debug, Clone, Default)]
pub struct RustSource {
    raw: RawOptions,
}

impl RustSource {
    pub fn new(raw: RawOptions) -> Self {
        Self { raw }
    }
}

fn kind_of(path: &Path) -> Result<SourceKind, DecodeError> {
    source_kind(path).ok_or_else(|| DecodeError::UnsupportedFormat(path.display().to_string()))
}

/// Decode a raster file to RGB. Alpha is dropped, grayscale is expanded.
fn decode_raster(path: &Path) -> Result<Frame<f32>, DecodeError> {
    let img = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    Ok(Frame::from(img.into_rgb8()))
}

impl ImageSource for RustSource {
    fn identify(&self, path: &Path) -> Result<FrameShape, DecodeError> {
        match kind_of(path)? {
            SourceKind::Raster => {
                let (width, height) = ImageReader::open(path)?
                    .with_guessed_format()?
                    .into_dimensions()?;
                Ok(FrameShape::rgb(width, height))
            }
            SourceKind::Raw => Ok(SensorData::load(path)?.shape()),
        }
    }

    fn decode(&self, path: &Path) -> Result<Frame<f32>, DecodeError> {
        match kind_of(path)? {
            SourceKind::Raster => decode_raster(path),
            SourceKind::Raw => decode_raw(path, &self.raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{write_gray_png, write_rgb_jpeg, write_rgb_png};

    #[test]
    fn identify_png_reads_header() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("frame.png");
        write_rgb_png(&path, 40, 30, |_, _| [0, 0, 0]);

        let shape = RustSource::default().identify(&path).unwrap();
        assert_eq!(shape, FrameShape::rgb(40, 30));
    }

    #[test]
    fn misnamed_png_identifies_as_it_decodes() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("frame.jpg");
        write_rgb_png(&path, 8, 4, |_, _| [1, 2, 3]);

        let source = RustSource::default();
        let shape = source.identify(&path).unwrap();
        assert_eq!(shape, FrameShape::rgb(8, 4));
        assert_eq!(source.decode(&path).unwrap().shape(), shape);
    }

    #[test]
    fn decode_png_is_exact_rgb() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("frame.png");
        write_rgb_png(&path, 3, 2, |x, y| [x as u8 * 10, y as u8 * 20, 7]);

        let frame = RustSource::default().decode(&path).unwrap();
        assert_eq!(frame.shape(), FrameShape::rgb(3, 2));
        assert_eq!(frame.sample(2, 1, 0), 20.0);
        assert_eq!(frame.sample(2, 1, 1), 20.0);
        assert_eq!(frame.sample(2, 1, 2), 7.0);
    }

    #[test]
    fn decode_grayscale_expands_to_rgb() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("gray.png");
        write_gray_png(&path, 2, 2, 99);

        let frame = RustSource::default().decode(&path).unwrap();
        assert_eq!(frame.channels(), 3);
        assert!(frame.samples().iter().all(|&v| v == 99.0));
    }

    #[test]
    fn decode_jpeg() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("frame.JPG");
        write_rgb_jpeg(&path, 64, 48);

        let frame = RustSource::default().decode(&path).unwrap();
        assert_eq!(frame.shape(), FrameShape::rgb(64, 48));
    }

    #[test]
    fn corrupt_file_is_decode_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("broken.jpg");
        std::fs::write(&path, b"definitely not a jpeg").unwrap();

        assert!(RustSource::default().decode(&path).is_err());
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = RustSource::default().decode(Path::new("/nonexistent/frame.png"));
        assert!(matches!(result, Err(DecodeError::Io(_))));
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let result = RustSource::default().decode(Path::new("notes.txt"));
        assert!(matches!(result, Err(DecodeError::UnsupportedFormat(_))));
    }

    #[test]
    fn corrupt_raw_is_decode_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("IMG_0001.CR2");
        std::fs::write(&path, [0u8; 64]).unwrap();

        assert!(RustSource::default().decode(&path).is_err());
        assert!(RustSource::default().identify(&path).is_err());
    }
}
