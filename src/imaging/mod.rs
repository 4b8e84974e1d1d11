//! Image decoding in pure Rust, no system libraries.
//!
//! | Concern | Crate / function |
//! |---|---|
//! | **Raster decode** | `image::ImageReader` (JPEG, PNG, TIFF) |
//! | **RAW readout** | `rawloader::decode_file` |
//! | **RAW development** | bilinear demosaic, white balance, clip, BT.709 curve |
//! | **Resampling** | `image::imageops::resize` (Lanczos3) |
//!
//! The module is split into:
//! - **Frame**: [`Frame`] buffers and [`FrameShape`]
//! - **Parameters**: [`RawOptions`], [`SizePolicy`]
//! - **Source**: [`ImageSource`] trait + [`RustSource`]
//! - **Loader**: [`FrameLoader`], the decode-or-fallback adapter

pub mod frame;
pub mod loader;
mod params;
pub mod raw;
pub mod rust_source;
pub mod source;

pub use frame::{DEFAULT_FALLBACK_SHAPE, Frame, FrameError, FrameShape};
pub use loader::{DecodeWarning, FrameLoader, LoadedFrame};
pub use params::{RawOptions, SizePolicy};
pub use rust_source::RustSource;
pub use source::{DecodeError, ImageSource, SourceKind, source_kind};
