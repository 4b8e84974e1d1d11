//! Decode-or-fallback adapter over an [`ImageSource`].
//!
//! A single unreadable file must not abort a batch of hundreds of exposures.
//! [`FrameLoader::load`] therefore never fails: when the source reports an
//! error it logs it, records a [`DecodeWarning`], and hands back a zero-filled
//! frame of the recorded fallback shape. A zero frame never raises a running
//! maximum, so the stack continues with a result that is a lower bound for
//! whatever the skipped exposure would have contributed.

use super::frame::{DEFAULT_FALLBACK_SHAPE, Frame, FrameShape};
use super::source::{DecodeError, ImageSource};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// A source that failed to decode and was replaced by a fallback frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodeWarning {
    /// 1-based position in the manifest.
    pub index: usize,
    pub path: PathBuf,
    /// Underlying cause, as reported by the decoder.
    pub cause: String,
}

impl DecodeWarning {
    pub(crate) fn new(index: usize, path: &Path, error: &DecodeError) -> Self {
        Self {
            index,
            path: path.to_path_buf(),
            cause: error.to_string(),
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

impl fmt::Display for DecodeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Could not decode {}: {}", self.file_name(), self.cause)
    }
}

/// Result of [`FrameLoader::load`].
#[derive(Debug)]
pub struct LoadedFrame {
    pub frame: Frame<f32>,
    /// Set when `frame` is a fallback.
    pub warning: Option<DecodeWarning>,
}

pub struct FrameLoader<'a, S: ImageSource + ?Sized> {
    source: &'a S,
    fallback_shape: FrameShape,
}

impl<'a, S: ImageSource + ?Sized> FrameLoader<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self {
            source,
            fallback_shape: DEFAULT_FALLBACK_SHAPE,
        }
    }

    pub fn fallback_shape(&self) -> FrameShape {
        self.fallback_shape
    }

    /// Record the shape used for fallback frames from now on.
    pub fn record_fallback_shape(&mut self, shape: FrameShape) {
        self.fallback_shape = shape;
    }

    /// Decode `path`, substituting a zero frame on failure.
    pub fn load(&self, index: usize, path: &Path) -> LoadedFrame {
        match self.source.decode(path) {
            Ok(frame) => LoadedFrame {
                frame,
                warning: None,
            },
            Err(e) => {
                let warning = DecodeWarning::new(index, path, &e);
                log::warn!("{warning}; using a blank {} frame", self.fallback_shape);
                LoadedFrame {
                    frame: Frame::zeros(self.fallback_shape),
                    warning: Some(warning),
                }
            }
        }
    }
}
