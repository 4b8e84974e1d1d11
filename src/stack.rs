//! Sequence driver: runs a manifest through the loader and the accumulator.
//!
//! [`StackSession`] exposes the run one frame at a time (`begin`, `step`,
//! `snapshot`, `finish`); [`stack`] is the usual loop over it with
//! cancellation checked at every frame boundary.
//!
//! ## Reference shape
//!
//! Before the first decode the session resolves the shape the accumulator
//! will have, using the caller's [`SizePolicy`]:
//!
//! | Policy | Reference | Frames of another size |
//! |---|---|---|
//! | `first` | first source that can be identified | [`StackError::ShapeMismatch`] |
//! | `smallest` | smallest identified source by area | Lanczos3 resample |
//! | `largest` | largest identified source by area | Lanczos3 resample |
//!
//! Ties go to the earlier file. The resolved shape is also recorded as the
//! loader's fallback shape, so a frame that fails to decode folds in as zeros
//! of the right size.
//!
//! When nothing can be identified the reference starts out as
//! [`DEFAULT_FALLBACK_SHAPE`] and is replaced by the shape of the first frame
//! that actually decodes. Only zero fallbacks can precede that frame, so the
//! accumulator restarts from it without losing anything.

use crate::accumulator::{AccumulatorError, AccumulatorState, MaxAccumulator};
use crate::config::StackConfig;
use crate::imaging::{
    DEFAULT_FALLBACK_SHAPE, DecodeWarning, Frame, FrameError, FrameLoader, FrameShape,
    ImageSource, LoadedFrame, RawOptions, SizePolicy,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub use crate::progress::{CancelToken, Progress, Stage, StackEvent, StackObserver};

#[derive(Error, Debug)]
pub enum StackError {
    #[error("No input images to stack")]
    EmptySequence,
    #[error(
        "Frame {index} ({}) is {actual} but the stack is {expected}; \
         use the smallest or largest size policy to resample",
        path.display()
    )]
    ShapeMismatch {
        index: usize,
        path: PathBuf,
        expected: FrameShape,
        actual: FrameShape,
    },
    #[error("Stacking cancelled after {processed} of {total} frames")]
    Cancelled { processed: usize, total: usize },
    #[error("Cannot resample frame {index}: {source}")]
    Resample {
        index: usize,
        #[source]
        source: FrameError,
    },
    #[error(transparent)]
    Accumulator(#[from] AccumulatorError),
}

/// Immutable settings for one run, built from the configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StackOptions {
    pub raw: RawOptions,
    pub size_policy: SizePolicy,
    pub gif_enabled: bool,
    pub gif_frame_duration: Duration,
    /// Longest GIF edge in pixels; `None` keeps the reference size.
    pub gif_max_edge: Option<u32>,
    /// Emit a preview every N frames (0: only after the last frame).
    pub preview_every: usize,
    pub jpeg_quality: u8,
}

impl StackOptions {
    pub fn from_config(config: &StackConfig) -> Self {
        Self {
            raw: config.raw,
            size_policy: config.output.size_policy,
            gif_enabled: config.gif.enabled,
            gif_frame_duration: Duration::from_millis(config.gif.frame_duration_ms),
            gif_max_edge: config.gif.max_edge,
            preview_every: config.preview.every,
            jpeg_quality: config.output.jpeg_quality,
        }
    }
}

impl Default for StackOptions {
    fn default() -> Self {
        Self::from_config(&StackConfig::default())
    }
}

/// Output of a completed stack.
#[derive(Debug, Clone, PartialEq)]
pub struct StackResult {
    pub image: Frame<u8>,
    /// Frames folded, fallbacks included.
    pub frames: usize,
    pub warnings: Vec<DecodeWarning>,
    pub reference: FrameShape,
}

/// Pick the accumulator shape for `paths` under `policy`. `None` when no
/// source can be identified.
pub fn resolve_reference_shape<S: ImageSource + ?Sized>(
    paths: &[PathBuf],
    source: &S,
    policy: SizePolicy,
) -> Option<FrameShape> {
    let identify = |path: &PathBuf| match source.identify(path) {
        Ok(shape) => Some(shape),
        Err(e) => {
            log::debug!("Cannot identify {}: {e}", path.display());
            None
        }
    };

    match policy {
        SizePolicy::First => paths.iter().find_map(identify),
        SizePolicy::Smallest => earliest_best(paths.iter().filter_map(identify), |a, b| {
            a.pixel_count() < b.pixel_count()
        }),
        SizePolicy::Largest => earliest_best(paths.iter().filter_map(identify), |a, b| {
            a.pixel_count() > b.pixel_count()
        }),
    }
}

/// First shape for which no later shape is strictly `better`.
fn earliest_best(
    shapes: impl Iterator<Item = FrameShape>,
    better: impl Fn(&FrameShape, &FrameShape) -> bool,
) -> Option<FrameShape> {
    shapes.fold(None, |best, shape| match best {
        Some(current) if !better(&shape, &current) => Some(current),
        _ => Some(shape),
    })
}

pub struct StackSession<'a, S: ImageSource + ?Sized> {
    paths: &'a [PathBuf],
    loader: FrameLoader<'a, S>,
    accumulator: MaxAccumulator,
    policy: SizePolicy,
    preview_every: usize,
    reference: FrameShape,
    /// The reference is the default placeholder and yields to the first
    /// decoded frame.
    provisional: bool,
    /// Position of the next source to fold; equals frames processed.
    next: usize,
    warnings: Vec<DecodeWarning>,
}

impl<'a, S: ImageSource + ?Sized> StackSession<'a, S> {
    /// Resolve the reference shape, decode the first source and start the
    /// accumulator. Reports progress `1 of N`.
    pub fn begin(
        paths: &'a [PathBuf],
        source: &'a S,
        options: &StackOptions,
        observer: &mut dyn StackObserver,
    ) -> Result<Self, StackError> {
        if paths.is_empty() {
            return Err(StackError::EmptySequence);
        }
        observer.on_stage(Stage::Stacking);

        let identified = resolve_reference_shape(paths, source, options.size_policy);
        let reference = identified.unwrap_or_else(|| {
            log::warn!(
                "No input could be identified; stacking at {DEFAULT_FALLBACK_SHAPE} \
                 until a frame decodes"
            );
            DEFAULT_FALLBACK_SHAPE
        });
        log::info!(
            "Stacking {} frames at {reference} ({} size policy)",
            paths.len(),
            options.size_policy
        );

        let mut loader = FrameLoader::new(source);
        loader.record_fallback_shape(reference);

        let mut session = Self {
            paths,
            loader,
            accumulator: MaxAccumulator::new(),
            policy: options.size_policy,
            preview_every: options.preview_every,
            reference,
            provisional: identified.is_none(),
            next: 0,
            warnings: Vec::new(),
        };
        let first = session.load(0, observer)?;
        session.fold(first)?;
        session.next = 1;
        session.report(observer)?;
        Ok(session)
    }

    /// Fold the next source. Returns `false` once the manifest is exhausted.
    ///
    /// On error the accumulator keeps its value from before the call.
    pub fn step(&mut self, observer: &mut dyn StackObserver) -> Result<bool, StackError> {
        if self.is_done() {
            return Ok(false);
        }
        let frame = self.load(self.next, observer)?;
        self.fold(frame)?;
        self.next += 1;
        log::debug!("Folded frame {}/{}", self.next, self.paths.len());
        self.report(observer)?;
        Ok(true)
    }

    pub fn processed(&self) -> usize {
        self.next
    }

    pub fn total(&self) -> usize {
        self.paths.len()
    }

    pub fn is_done(&self) -> bool {
        self.next >= self.paths.len()
    }

    pub fn reference(&self) -> FrameShape {
        self.reference
    }

    pub fn warnings(&self) -> &[DecodeWarning] {
        &self.warnings
    }

    /// 8-bit copy of the running maximum.
    pub fn snapshot(&self) -> Result<Frame<u8>, StackError> {
        Ok(self.accumulator.snapshot()?)
    }

    pub fn finish(mut self) -> Result<StackResult, StackError> {
        let image = self.accumulator.finish()?;
        Ok(StackResult {
            image,
            frames: self.next,
            warnings: self.warnings,
            reference: self.reference,
        })
    }

    fn load(
        &mut self,
        position: usize,
        observer: &mut dyn StackObserver,
    ) -> Result<Frame<f32>, StackError> {
        let paths = self.paths;
        let path = &paths[position];
        let index = position + 1;

        let LoadedFrame { frame, warning } = self.loader.load(index, path);
        match warning {
            Some(warning) => {
                observer.on_warning(&warning.to_string());
                self.warnings.push(warning);
            }
            None if self.provisional => self.adopt_reference(index, frame.shape()),
            None => {}
        }
        self.reconcile(index, path, frame)
    }

    /// Take `shape` as the reference in place of the default placeholder.
    fn adopt_reference(&mut self, index: usize, shape: FrameShape) {
        log::info!("Frame {index} decoded at {shape}; using it as the stack size");
        self.reference = shape;
        self.provisional = false;
        self.loader.record_fallback_shape(shape);
        // Everything folded so far is zero fallback
        self.accumulator = MaxAccumulator::new();
    }

    fn fold(&mut self, frame: Frame<f32>) -> Result<(), StackError> {
        if self.accumulator.state() == AccumulatorState::Empty {
            self.accumulator.begin(frame)?;
        } else {
            self.accumulator.fold_next(&frame)?;
        }
        Ok(())
    }

    fn reconcile(
        &self,
        index: usize,
        path: &Path,
        frame: Frame<f32>,
    ) -> Result<Frame<f32>, StackError> {
        let actual = frame.shape();
        if actual == self.reference {
            return Ok(frame);
        }
        if self.policy.resamples() && actual.channels == self.reference.channels {
            log::debug!("Resampling frame {index} from {actual} to {}", self.reference);
            return frame
                .resized(self.reference.width, self.reference.height)
                .map_err(|source| StackError::Resample { index, source });
        }
        Err(StackError::ShapeMismatch {
            index,
            path: path.to_path_buf(),
            expected: self.reference,
            actual,
        })
    }

    fn report(&self, observer: &mut dyn StackObserver) -> Result<(), StackError> {
        let progress = Progress {
            index: self.next,
            total: self.paths.len(),
        };
        observer.on_progress(progress);

        let periodic = self.preview_every > 0 && progress.index % self.preview_every == 0;
        if periodic || progress.index == progress.total {
            observer.on_preview(&self.accumulator.snapshot()?);
        }
        Ok(())
    }
}

/// Stack `paths` in order, checking `cancel` before every frame.
///
/// A cancelled run discards the accumulator and returns
/// [`StackError::Cancelled`].
pub fn stack<S: ImageSource + ?Sized>(
    paths: &[PathBuf],
    source: &S,
    options: &StackOptions,
    observer: &mut dyn StackObserver,
    cancel: &CancelToken,
) -> Result<StackResult, StackError> {
    if paths.is_empty() {
        return Err(StackError::EmptySequence);
    }
    let total = paths.len();
    if cancel.is_cancelled() {
        return Err(StackError::Cancelled {
            processed: 0,
            total,
        });
    }

    let mut session = StackSession::begin(paths, source, options, observer)?;
    while !session.is_done() {
        if cancel.is_cancelled() {
            log::info!("Cancelled after {} of {total} frames", session.processed());
            return Err(StackError::Cancelled {
                processed: session.processed(),
                total,
            });
        }
        session.step(observer)?;
    }

    let result = session.finish()?;
    log::info!(
        "Stacked {} frames ({} could not be decoded)",
        result.frames,
        result.warnings.len()
    );
    Ok(result)
}
