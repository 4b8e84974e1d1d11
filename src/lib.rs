//! # Star Trail
//!
//! Stacks a sequence of night-sky exposures into a single star trail image.
//! Each output pixel holds the brightest value that pixel reached anywhere in
//! the sequence, so stars moving across the sky leave continuous arcs over a
//! still foreground. The same sequence can also be written as a looping GIF
//! timelapse.
//!
//! # Architecture: Streaming Maximum
//!
//! ```text
//! 1. Scan     night/     →  Manifest           (sorted list of frame paths)
//! 2. Stack    Manifest   →  Frame<u8>          (decode one frame, fold, drop)
//! 3. Export   Frame<u8>  →  star_trail.jpg
//!             Manifest   →  star_trail_timelapse.gif
//! ```
//!
//! Only two buffers are ever resident while stacking: the running maximum and
//! the frame being folded into it. A sequence of a thousand 20-megapixel RAW
//! files needs the same memory as a sequence of two.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`scan`] | Lists supported files in the input directory, sorted |
//! | [`imaging`] | Frame buffers, raster and RAW decoding, decode-or-fallback loader |
//! | [`accumulator`] | The per-pixel maximum state machine |
//! | [`stack`] | Drives a manifest through the loader and accumulator; size policies |
//! | [`export`] | Writes the stacked raster and the GIF timelapse |
//! | [`pipeline`] | Stack then export, with per-artifact outcomes |
//! | [`progress`] | Observer trait, event channel, cancellation token |
//! | [`config`] | `star-trail.toml` loading, validation, merging |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Failures Stay Local
//!
//! Star trail sequences run to hundreds of frames, and one truncated file on a
//! memory card should not throw away an hour of shooting. A frame that cannot
//! be decoded is replaced with a blank frame of the stack's size and reported
//! as a warning. Because a blank frame never raises a maximum, the result is
//! the stack of every frame that did decode. Only structural problems (an
//! empty input, frames of incompatible size) stop the run.
//!
//! ## Observer Instead of Callbacks Into a UI
//!
//! The stacking core reports progress, previews and warnings through
//! [`progress::StackObserver`]. The CLI forwards them over an `mpsc` channel
//! from a worker thread to the display thread; tests record them. The core
//! never touches a terminal.
//!
//! ## Pure-Rust Imaging
//!
//! Raster formats and the GIF encoder come from the `image` crate, RAW sensor
//! readout from `rawloader`. Development (demosaic, white balance, clip,
//! gamma) is done in [`imaging::raw`]. No system libraries are needed, so the
//! binary runs on any machine as-is.

pub mod accumulator;
pub mod config;
pub mod export;
pub mod imaging;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod scan;
pub mod stack;

#[cfg(test)]
pub(crate) mod test_helpers;
