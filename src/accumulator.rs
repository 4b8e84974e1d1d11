//! Streaming per-pixel maximum.
//!
//! [`MaxAccumulator`] holds a single `f32` buffer shaped like the first frame
//! and folds later frames into it with an elementwise maximum. Only the
//! accumulator and the frame being folded are ever resident, so memory is
//! bounded by the frame size no matter how long the sequence is.
//!
//! ```text
//!          begin            fold_next (self-loop)        finish
//!  Empty ─────────▶ Accumulating ◀──────────┐  ─────────────▶ Finished
//!                        └──────────────────┘
//! ```
//!
//! `snapshot` is a side-effect-free query in `Accumulating` and `Finished`.
//! Nothing leaves `Finished`.
//!
//! Because `max` is commutative, associative and idempotent, the final buffer
//! does not depend on the order frames arrive in, and folding an all-zero
//! frame never changes it.

use crate::imaging::{Frame, FrameShape};
use rayon::prelude::*;
use thiserror::Error;

/// Samples per parallel work unit in [`MaxAccumulator::fold_next`].
const FOLD_CHUNK: usize = 64 * 1024;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AccumulatorError {
    #[error("Frame shape {actual} does not match accumulator shape {expected}")]
    ShapeMismatch {
        expected: FrameShape,
        actual: FrameShape,
    },
    #[error("Accumulator has not been started")]
    NotStarted,
    #[error("Accumulator was already started")]
    AlreadyStarted,
    #[error("Accumulator is finished")]
    Finished,
}

/// Lifecycle position of a [`MaxAccumulator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorState {
    Empty,
    Accumulating,
    Finished,
}

#[derive(Debug)]
enum State {
    Empty,
    Accumulating { buffer: Frame<f32>, frames: usize },
    Finished { result: Frame<u8>, frames: usize },
}

#[derive(Debug)]
pub struct MaxAccumulator {
    state: State,
}

impl Default for MaxAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl MaxAccumulator {
    pub fn new() -> Self {
        Self {
            state: State::Empty,
        }
    }

    pub fn state(&self) -> AccumulatorState {
        match self.state {
            State::Empty => AccumulatorState::Empty,
            State::Accumulating { .. } => AccumulatorState::Accumulating,
            State::Finished { .. } => AccumulatorState::Finished,
        }
    }

    /// Shape of the accumulator, once started.
    pub fn shape(&self) -> Option<FrameShape> {
        match &self.state {
            State::Empty => None,
            State::Accumulating { buffer, .. } => Some(buffer.shape()),
            State::Finished { result, .. } => Some(result.shape()),
        }
    }

    /// Number of frames merged so far, including the first.
    pub fn frames_folded(&self) -> usize {
        match self.state {
            State::Empty => 0,
            State::Accumulating { frames, .. } | State::Finished { frames, .. } => frames,
        }
    }

    /// Initialize from the first frame of a sequence.
    pub fn begin(&mut self, first: Frame<f32>) -> Result<(), AccumulatorError> {
        match self.state {
            State::Empty => {
                self.state = State::Accumulating {
                    buffer: first,
                    frames: 1,
                };
                Ok(())
            }
            State::Accumulating { .. } => Err(AccumulatorError::AlreadyStarted),
            State::Finished { .. } => Err(AccumulatorError::Finished),
        }
    }

    /// Merge `frame` into the running maximum.
    ///
    /// On a shape mismatch the accumulator is left untouched.
    pub fn fold_next(&mut self, frame: &Frame<f32>) -> Result<(), AccumulatorError> {
        let (buffer, frames) = match &mut self.state {
            State::Accumulating { buffer, frames } => (buffer, frames),
            State::Empty => return Err(AccumulatorError::NotStarted),
            State::Finished { .. } => return Err(AccumulatorError::Finished),
        };
        if buffer.shape() != frame.shape() {
            return Err(AccumulatorError::ShapeMismatch {
                expected: buffer.shape(),
                actual: frame.shape(),
            });
        }

        buffer
            .samples_mut()
            .par_chunks_mut(FOLD_CHUNK)
            .zip(frame.samples().par_chunks(FOLD_CHUNK))
            .for_each(|(acc, incoming)| {
                for (a, &b) in acc.iter_mut().zip(incoming) {
                    *a = a.max(b);
                }
            });
        *frames += 1;
        Ok(())
    }

    /// An 8-bit copy of the current maximum. The accumulator is not touched.
    pub fn snapshot(&self) -> Result<Frame<u8>, AccumulatorError> {
        match &self.state {
            State::Empty => Err(AccumulatorError::NotStarted),
            State::Accumulating { buffer, .. } => Ok(buffer.narrow()),
            State::Finished { result, .. } => Ok(result.clone()),
        }
    }

    /// Narrow the accumulator to 8-bit and move to `Finished`.
    pub fn finish(&mut self) -> Result<Frame<u8>, AccumulatorError> {
        match std::mem::replace(&mut self.state, State::Empty) {
            State::Accumulating { buffer, frames } => {
                let result = buffer.narrow();
                self.state = State::Finished {
                    result: result.clone(),
                    frames,
                };
                Ok(result)
            }
            State::Empty => Err(AccumulatorError::NotStarted),
            finished @ State::Finished { .. } => {
                self.state = finished;
                Err(AccumulatorError::Finished)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{flat_frame, luma_frame};

    fn fold_all(frames: &[Frame<f32>]) -> Frame<u8> {
        let mut acc = MaxAccumulator::new();
        acc.begin(frames[0].clone()).unwrap();
        for frame in &frames[1..] {
            acc.fold_next(frame).unwrap();
        }
        acc.finish().unwrap()
    }

    #[test]
    fn three_single_pixel_frames_keep_brightest() {
        let frames = [
            luma_frame(1, 1, &[10.0]),
            luma_frame(1, 1, &[200.0]),
            luma_frame(1, 1, &[50.0]),
        ];
        assert_eq!(fold_all(&frames).samples(), &[200]);
    }

    #[test]
    fn result_is_pointwise_maximum() {
        let frames = [
            luma_frame(2, 2, &[1.0, 90.0, 3.0, 0.0]),
            luma_frame(2, 2, &[50.0, 2.0, 3.0, 255.0]),
            luma_frame(2, 2, &[7.0, 8.0, 120.0, 1.0]),
        ];
        assert_eq!(fold_all(&frames).samples(), &[50, 90, 120, 255]);
    }

    #[test]
    fn processing_order_does_not_matter() {
        let a = luma_frame(3, 1, &[10.0, 0.0, 30.0]);
        let b = luma_frame(3, 1, &[0.0, 99.0, 5.0]);
        let c = luma_frame(3, 1, &[20.0, 1.0, 31.0]);

        let forward = fold_all(&[a.clone(), b.clone(), c.clone()]);
        let reversed = fold_all(&[c.clone(), b.clone(), a.clone()]);
        let shuffled = fold_all(&[b, a, c]);
        assert_eq!(forward, reversed);
        assert_eq!(forward, shuffled);
    }

    #[test]
    fn folding_the_maximum_again_is_idempotent() {
        let a = luma_frame(2, 1, &[10.0, 80.0]);
        let b = luma_frame(2, 1, &[40.0, 20.0]);
        let mut acc = MaxAccumulator::new();
        acc.begin(a).unwrap();
        acc.fold_next(&b).unwrap();
        let before = acc.snapshot().unwrap();

        let maxima = before.widen();
        acc.fold_next(&maxima).unwrap();
        acc.fold_next(&maxima).unwrap();
        assert_eq!(acc.snapshot().unwrap(), before);
    }

    #[test]
    fn zero_frame_changes_nothing() {
        let a = flat_frame(FrameShape::rgb(4, 3), 17.0);
        let b = flat_frame(FrameShape::rgb(4, 3), 3.0);
        let zero = Frame::zeros(FrameShape::rgb(4, 3));

        let without = fold_all(&[a.clone(), b.clone()]);
        let with = fold_all(&[a, zero, b]);
        assert_eq!(with, without);
    }

    #[test]
    fn fold_spans_multiple_parallel_chunks() {
        let len = FOLD_CHUNK * 2 + 5;
        let low = vec![1.0f32; len];
        let mut high = vec![0.0f32; len];
        high[len - 1] = 250.0;
        high[FOLD_CHUNK] = 99.0;

        let shape = FrameShape::new(len as u32, 1, 1);
        let result = fold_all(&[
            Frame::from_samples(shape, low).unwrap(),
            Frame::from_samples(shape, high).unwrap(),
        ]);
        assert_eq!(result.samples()[0], 1);
        assert_eq!(result.samples()[FOLD_CHUNK], 99);
        assert_eq!(result.samples()[len - 1], 250);
    }

    #[test]
    fn snapshot_after_begin_is_narrowed_first_frame() {
        let first = luma_frame(2, 1, &[12.7, 300.0]);
        let mut acc = MaxAccumulator::new();
        acc.begin(first.clone()).unwrap();
        assert_eq!(acc.snapshot().unwrap(), first.narrow());
        assert_eq!(acc.snapshot().unwrap().samples(), &[12, 255]);
    }

    #[test]
    fn snapshot_is_a_copy() {
        let mut acc = MaxAccumulator::new();
        acc.begin(luma_frame(1, 1, &[5.0])).unwrap();
        let early = acc.snapshot().unwrap();
        acc.fold_next(&luma_frame(1, 1, &[9.0])).unwrap();

        assert_eq!(early.samples(), &[5]);
        assert_eq!(acc.snapshot().unwrap().samples(), &[9]);
    }

    #[test]
    fn snapshot_after_finish_equals_result() {
        let mut acc = MaxAccumulator::new();
        acc.begin(luma_frame(1, 2, &[3.0, 4.0])).unwrap();
        acc.fold_next(&luma_frame(1, 2, &[8.0, 1.0])).unwrap();
        let result = acc.finish().unwrap();

        assert_eq!(acc.state(), AccumulatorState::Finished);
        assert_eq!(acc.snapshot().unwrap(), result);
    }

    #[test]
    fn shape_mismatch_leaves_accumulator_unchanged() {
        let mut acc = MaxAccumulator::new();
        acc.begin(flat_frame(FrameShape::rgb(100, 100), 10.0)).unwrap();
        let before = acc.snapshot().unwrap();

        let err = acc
            .fold_next(&flat_frame(FrameShape::rgb(50, 50), 200.0))
            .unwrap_err();
        assert_eq!(
            err,
            AccumulatorError::ShapeMismatch {
                expected: FrameShape::rgb(100, 100),
                actual: FrameShape::rgb(50, 50),
            }
        );
        assert_eq!(acc.snapshot().unwrap(), before);
        assert_eq!(acc.frames_folded(), 1);
        assert_eq!(acc.state(), AccumulatorState::Accumulating);
    }

    #[test]
    fn channel_count_mismatch_is_rejected() {
        let mut acc = MaxAccumulator::new();
        acc.begin(Frame::zeros(FrameShape::new(2, 2, 1))).unwrap();
        assert!(matches!(
            acc.fold_next(&Frame::zeros(FrameShape::rgb(2, 2))),
            Err(AccumulatorError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn state_machine_transitions() {
        let mut acc = MaxAccumulator::new();
        assert_eq!(acc.state(), AccumulatorState::Empty);
        assert_eq!(acc.shape(), None);
        assert_eq!(acc.snapshot(), Err(AccumulatorError::NotStarted));
        assert_eq!(
            acc.fold_next(&luma_frame(1, 1, &[1.0])),
            Err(AccumulatorError::NotStarted)
        );
        assert_eq!(acc.finish(), Err(AccumulatorError::NotStarted));

        acc.begin(luma_frame(1, 1, &[1.0])).unwrap();
        assert_eq!(acc.state(), AccumulatorState::Accumulating);
        assert_eq!(
            acc.begin(luma_frame(1, 1, &[1.0])),
            Err(AccumulatorError::AlreadyStarted)
        );

        acc.fold_next(&luma_frame(1, 1, &[2.0])).unwrap();
        assert_eq!(acc.frames_folded(), 2);
        acc.finish().unwrap();

        assert_eq!(acc.finish(), Err(AccumulatorError::Finished));
        assert_eq!(
            acc.fold_next(&luma_frame(1, 1, &[3.0])),
            Err(AccumulatorError::Finished)
        );
        assert_eq!(
            acc.begin(luma_frame(1, 1, &[3.0])),
            Err(AccumulatorError::Finished)
        );
        assert_eq!(acc.state(), AccumulatorState::Finished);
        assert_eq!(acc.frames_folded(), 2);
        assert_eq!(acc.shape(), Some(FrameShape::new(1, 1, 1)));
    }
}
