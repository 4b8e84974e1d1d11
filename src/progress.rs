//! Progress reporting and cancellation.
//!
//! The stacking core never talks to a display. It reports through a
//! [`StackObserver`]; the CLI uses the `mpsc::Sender<StackEvent>`
//! implementation so that events cross from the worker thread to the display
//! thread in order, and tests use recorders.

use crate::imaging::Frame;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;

/// Frames handled so far out of the sequence length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// 1-based index of the frame just handled.
    pub index: usize,
    pub total: usize,
}

impl Progress {
    pub fn percent(&self) -> usize {
        if self.total == 0 {
            return 100;
        }
        self.index * 100 / self.total
    }
}

/// Pipeline phase, announced before its first progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Stacking,
    WritingImage,
    WritingTimelapse,
}

pub trait StackObserver {
    fn on_stage(&mut self, _stage: Stage) {}
    fn on_progress(&mut self, progress: Progress);
    /// An 8-bit copy of the accumulator; the observer may keep it.
    fn on_preview(&mut self, preview: &Frame<u8>);
    fn on_warning(&mut self, message: &str);
    fn on_complete(&mut self, artifacts: &[PathBuf]);
    fn on_fatal(&mut self, message: &str);
}

/// Owned form of every observer callback.
#[derive(Debug, Clone, PartialEq)]
pub enum StackEvent {
    Stage(Stage),
    Progress(Progress),
    Preview(Frame<u8>),
    Warning(String),
    Complete(Vec<PathBuf>),
    Fatal(String),
}

/// Forwards events to a channel. A dropped receiver is ignored: the run
/// keeps going without a display.
impl StackObserver for Sender<StackEvent> {
    fn on_stage(&mut self, stage: Stage) {
        let _ = self.send(StackEvent::Stage(stage));
    }

    fn on_progress(&mut self, progress: Progress) {
        let _ = self.send(StackEvent::Progress(progress));
    }

    fn on_preview(&mut self, preview: &Frame<u8>) {
        let _ = self.send(StackEvent::Preview(preview.clone()));
    }

    fn on_warning(&mut self, message: &str) {
        let _ = self.send(StackEvent::Warning(message.to_string()));
    }

    fn on_complete(&mut self, artifacts: &[PathBuf]) {
        let _ = self.send(StackEvent::Complete(artifacts.to_vec()));
    }

    fn on_fatal(&mut self, message: &str) {
        let _ = self.send(StackEvent::Fatal(message.to_string()));
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl StackObserver for NullObserver {
    fn on_progress(&mut self, _progress: Progress) {}
    fn on_preview(&mut self, _preview: &Frame<u8>) {}
    fn on_warning(&mut self, _message: &str) {}
    fn on_complete(&mut self, _artifacts: &[PathBuf]) {}
    fn on_fatal(&mut self, _message: &str) {}
}

/// Shared cancellation flag, checked between frames.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
