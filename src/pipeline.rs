//! Whole-run orchestration: stack, then write each artifact.
//!
//! ```text
//! manifest ──▶ stack ──▶ write_image      ──▶ ArtifactOutcome (raster)
//!                   └──▶ write_timelapse  ──▶ ArtifactOutcome (GIF, optional)
//! ```
//!
//! A stacking failure ends the run before anything is written. After that,
//! each artifact succeeds or fails on its own: a failed raster does not stop
//! the GIF, and a failed GIF does not remove the raster.

use crate::config::StackConfig;
use crate::export::{self, TimelapseSettings};
use crate::imaging::{DecodeWarning, FrameShape, ImageSource};
use crate::progress::{CancelToken, Stage, StackObserver};
use crate::stack::{self, StackError, StackOptions};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Stack(#[from] StackError),
}

/// Where each artifact goes.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTargets {
    pub image: PathBuf,
    /// `None` disables the timelapse.
    pub timelapse: Option<PathBuf>,
}

impl OutputTargets {
    pub fn from_config(output_dir: &Path, config: &StackConfig) -> Self {
        Self {
            image: output_dir.join(&config.output.image),
            timelapse: config
                .gif
                .enabled
                .then(|| output_dir.join(&config.gif.filename)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactOutcome {
    Written(PathBuf),
    Failed { path: PathBuf, error: String },
}

impl ArtifactOutcome {
    pub fn path(&self) -> &Path {
        match self {
            ArtifactOutcome::Written(path) | ArtifactOutcome::Failed { path, .. } => path,
        }
    }

    pub fn is_written(&self) -> bool {
        matches!(self, ArtifactOutcome::Written(_))
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub total: usize,
    pub frames: usize,
    pub reference: FrameShape,
    /// Sources replaced by fallback frames while stacking.
    pub warnings: Vec<DecodeWarning>,
    pub image: ArtifactOutcome,
    pub timelapse: Option<ArtifactOutcome>,
    /// Frames encoded into the timelapse.
    pub timelapse_frames: usize,
}

impl RunReport {
    pub fn written(&self) -> Vec<PathBuf> {
        std::iter::once(&self.image)
            .chain(self.timelapse.as_ref())
            .filter(|outcome| outcome.is_written())
            .map(|outcome| outcome.path().to_path_buf())
            .collect()
    }

    /// True when every requested artifact was written.
    pub fn is_complete(&self) -> bool {
        self.image.is_written() && self.timelapse.as_ref().is_none_or(ArtifactOutcome::is_written)
    }
}

/// Stack `paths` and write the artifacts in `targets`.
///
/// Stacking errors are reported through `observer.on_fatal` and returned;
/// artifact errors are reported the same way but recorded in the
/// [`RunReport`] instead.
pub fn run<S: ImageSource + ?Sized>(
    paths: &[PathBuf],
    source: &S,
    options: &StackOptions,
    targets: &OutputTargets,
    observer: &mut dyn StackObserver,
    cancel: &CancelToken,
) -> Result<RunReport, RunError> {
    let result = match stack::stack(paths, source, options, observer, cancel) {
        Ok(result) => result,
        Err(e) => {
            log::error!("{e}");
            observer.on_fatal(&e.to_string());
            return Err(e.into());
        }
    };

    observer.on_stage(Stage::WritingImage);
    let image = match export::write_image(&result.image, &targets.image, options.jpeg_quality) {
        Ok(()) => ArtifactOutcome::Written(targets.image.clone()),
        Err(e) => failed(&targets.image, &e, observer),
    };

    let mut timelapse_frames = 0;
    let timelapse = match (&targets.timelapse, options.gif_enabled) {
        (Some(path), true) => {
            observer.on_stage(Stage::WritingTimelapse);
            let settings = TimelapseSettings {
                frame_duration: options.gif_frame_duration,
                reference: result.reference,
                max_edge: options.gif_max_edge,
            };
            Some(
                match export::write_timelapse(paths, source, &settings, path, observer, cancel) {
                    Ok(summary) => {
                        timelapse_frames = summary.frames;
                        ArtifactOutcome::Written(summary.path)
                    }
                    Err(e) => failed(path, &e, observer),
                },
            )
        }
        _ => None,
    };

    let report = RunReport {
        total: paths.len(),
        frames: result.frames,
        reference: result.reference,
        warnings: result.warnings,
        image,
        timelapse,
        timelapse_frames,
    };
    observer.on_complete(&report.written());
    Ok(report)
}

fn failed(
    path: &Path,
    error: &dyn std::error::Error,
    observer: &mut dyn StackObserver,
) -> ArtifactOutcome {
    let message = format!("Could not write {}: {error}", path.display());
    log::error!("{message}");
    observer.on_fatal(&message);
    ArtifactOutcome::Failed {
        path: path.to_path_buf(),
        error: error.to_string(),
    }
}
