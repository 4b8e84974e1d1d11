//! Image source trait and shared types.
//!
//! The [`ImageSource`] trait is the seam between the stacking logic and the
//! decoders. Every source supports two operations:
//!
//! - **identify**: the [`FrameShape`] a file will decode to, as cheaply as the
//!   format allows
//! - **decode**: the full RGB [`Frame<f32>`]
//!
//! The production implementation is
//! [`RustSource`](super::rust_source::RustSource). Tests use the
//! `MockSource` defined below.

use super::frame::{Frame, FrameError, FrameShape};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Image(#[from] image::ImageError),
    #[error("RAW decoder failed: {0}")]
    Raw(String),
    #[error("Unsupported RAW sensor layout: {0}")]
    UnsupportedRaw(String),
    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),
    #[error("Invalid frame: {0}")]
    Frame(#[from] FrameError),
}

/// Which decoder family handles a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Standard raster formats decoded by the `image` crate.
    Raster,
    /// Camera RAW decoded through `rawloader`.
    Raw,
}

/// Raster extensions accepted as input.
pub const RASTER_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff"];

/// Camera RAW extension accepted as input.
pub const RAW_EXTENSION: &str = "cr2";

/// Classify a path by extension (case-insensitive). `None` if not accepted.
pub fn source_kind(path: &Path) -> Option<SourceKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if ext == RAW_EXTENSION {
        Some(SourceKind::Raw)
    } else if RASTER_EXTENSIONS.contains(&ext.as_str()) {
        Some(SourceKind::Raster)
    } else {
        None
    }
}

/// Trait for frame decoders.
///
/// `Sync` so a source can be shared with the worker thread by reference.
pub trait ImageSource: Sync {
    /// Shape the file decodes to.
    fn identify(&self, path: &Path) -> Result<FrameShape, DecodeError>;

    /// Decode to RGB `f32` samples on the 0–255 scale.
    fn decode(&self, path: &Path) -> Result<Frame<f32>, DecodeError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// In-memory source keyed by path. Paths without a frame fail to decode.
    #[derive(Default)]
    pub struct MockSource {
        pub frames: HashMap<PathBuf, Frame<f32>>,
        pub decoded: Mutex<Vec<PathBuf>>,
        /// `identify` fails for every path while `decode` still works.
        pub headerless: bool,
    }

    impl MockSource {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_frame(mut self, path: impl Into<PathBuf>, frame: Frame<f32>) -> Self {
            self.frames.insert(path.into(), frame);
            self
        }

        pub fn without_identify(mut self) -> Self {
            self.headerless = true;
            self
        }

        /// Paths passed to `decode`, in call order.
        pub fn decode_calls(&self) -> Vec<PathBuf> {
            self.decoded.lock().unwrap().clone()
        }
    }

    impl ImageSource for MockSource {
        fn identify(&self, path: &Path) -> Result<FrameShape, DecodeError> {
            if self.headerless {
                return Err(DecodeError::UnsupportedFormat(format!(
                    "unreadable header in {}",
                    path.display()
                )));
            }
            self.frames.get(path).map(Frame::shape).ok_or_else(|| {
                DecodeError::UnsupportedFormat(format!("no mock for {}", path.display()))
            })
        }

        fn decode(&self, path: &Path) -> Result<Frame<f32>, DecodeError> {
            self.decoded.lock().unwrap().push(path.to_path_buf());
            self.frames.get(path).cloned().ok_or_else(|| {
                DecodeError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no mock for {}", path.display()),
                ))
            })
        }
    }

    #[test]
    fn source_kind_by_extension() {
        assert_eq!(source_kind(Path::new("a/IMG_0001.JPG")), Some(SourceKind::Raster));
        assert_eq!(source_kind(Path::new("b.tiff")), Some(SourceKind::Raster));
        assert_eq!(source_kind(Path::new("c.CR2")), Some(SourceKind::Raw));
        assert_eq!(source_kind(Path::new("d.nef")), None);
        assert_eq!(source_kind(Path::new("no_extension")), None);
    }

    #[test]
    fn mock_records_decodes_and_fails_unknown_paths() {
        let frame = Frame::<f32>::zeros(FrameShape::rgb(2, 2));
        let source = MockSource::new().with_frame("/a.png", frame.clone());

        assert_eq!(source.decode(Path::new("/a.png")).unwrap(), frame);
        assert!(source.decode(Path::new("/b.png")).is_err());
        assert_eq!(source.identify(Path::new("/a.png")).unwrap(), frame.shape());
        assert_eq!(
            source.decode_calls(),
            vec![PathBuf::from("/a.png"), PathBuf::from("/b.png")]
        );
    }
}
