//! Artifact writers: the stacked raster and the animated GIF timelapse.
//!
//! | Artifact | Encoder |
//! |---|---|
//! | JPEG | `image::codecs::jpeg::JpegEncoder` with the configured quality |
//! | PNG, TIFF | `image` crate, format chosen from the extension |
//! | GIF timelapse | `image::codecs::gif::GifEncoder`, infinite loop |
//!
//! The timelapse is built from the original decoded frames in manifest
//! order, not from accumulator snapshots. Frames that fail to decode are
//! skipped with a warning.

use crate::imaging::{DecodeWarning, Frame, FrameError, FrameShape, ImageSource};
use crate::progress::{CancelToken, Progress, StackObserver};
use image::codecs::gif::{GifEncoder, Repeat};
use image::codecs::jpeg::JpegEncoder;
use image::{Delay, DynamicImage, Frame as AnimationFrame, ImageFormat};
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// GIF quantizer speed (1 best, 30 fastest).
const GIF_SPEED: i32 = 10;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error writing {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Encoding {} failed: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("Unsupported output format: {0} (use .jpg, .png or .tif)")]
    UnsupportedFormat(String),
    #[error("Invalid frame: {0}")]
    Frame(#[from] FrameError),
    #[error("None of the {0} frames could be decoded for the timelapse")]
    NoFrames(usize),
    #[error("Timelapse cancelled after {written} frames")]
    Cancelled { written: usize },
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> ExportError + '_ {
    move |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn encode_error(path: &Path) -> impl FnOnce(image::ImageError) -> ExportError + '_ {
    move |source| ExportError::Encode {
        path: path.to_path_buf(),
        source,
    }
}

/// Create `path`'s parent directory if needed.
fn ensure_parent(path: &Path) -> Result<(), ExportError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(io_error(parent))
        }
        _ => Ok(()),
    }
}

/// Write the stacked image as 8-bit RGB. The format follows the extension.
pub fn write_image(frame: &Frame<u8>, path: &Path, jpeg_quality: u8) -> Result<(), ExportError> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let format = match ext.as_str() {
        "jpg" | "jpeg" => ImageFormat::Jpeg,
        "png" => ImageFormat::Png,
        "tif" | "tiff" => ImageFormat::Tiff,
        _ => return Err(ExportError::UnsupportedFormat(path.display().to_string())),
    };

    let rgb = DynamicImage::ImageRgb8(frame.to_dynamic_image()?.into_rgb8());
    ensure_parent(path)?;

    if format == ImageFormat::Jpeg {
        let file = File::create(path).map_err(io_error(path))?;
        let encoder = JpegEncoder::new_with_quality(BufWriter::new(file), jpeg_quality);
        rgb.write_with_encoder(encoder).map_err(encode_error(path))?;
    } else {
        rgb.save_with_format(path, format).map_err(encode_error(path))?;
    }
    log::info!("Wrote {} ({})", path.display(), frame.shape());
    Ok(())
}

/// Timelapse layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelapseSettings {
    pub frame_duration: Duration,
    /// Shape every frame is resampled to before encoding.
    pub reference: FrameShape,
    pub max_edge: Option<u32>,
}

impl TimelapseSettings {
    /// Output dimensions: the reference size, scaled down so the longer edge
    /// is at most `max_edge`.
    pub fn output_size(&self) -> (u32, u32) {
        let (w, h) = (self.reference.width, self.reference.height);
        match self.max_edge {
            Some(max) if max > 0 && w.max(h) > max => {
                let scale = f64::from(max) / f64::from(w.max(h));
                let scaled = |v: u32| ((f64::from(v) * scale).round() as u32).max(1);
                (scaled(w), scaled(h))
            }
            _ => (w, h),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimelapseSummary {
    pub path: PathBuf,
    pub frames: usize,
    pub skipped: Vec<DecodeWarning>,
}

/// Encode `paths` as a looping GIF at `out`.
///
/// No file is created unless at least one frame decodes. A write that fails
/// or is cancelled removes the partial file.
pub fn write_timelapse<S: ImageSource + ?Sized>(
    paths: &[PathBuf],
    source: &S,
    settings: &TimelapseSettings,
    out: &Path,
    observer: &mut dyn StackObserver,
    cancel: &CancelToken,
) -> Result<TimelapseSummary, ExportError> {
    let mut created = false;
    let result = encode_timelapse(paths, source, settings, out, observer, cancel, &mut created);
    if result.is_err() && created {
        discard_partial(out);
    }
    result
}

fn discard_partial(out: &Path) {
    match fs::remove_file(out) {
        Ok(()) => log::debug!("Removed partial timelapse {}", out.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Could not remove partial timelapse {}: {e}", out.display()),
    }
}

fn encode_timelapse<S: ImageSource + ?Sized>(
    paths: &[PathBuf],
    source: &S,
    settings: &TimelapseSettings,
    out: &Path,
    observer: &mut dyn StackObserver,
    cancel: &CancelToken,
    created: &mut bool,
) -> Result<TimelapseSummary, ExportError> {
    let total = paths.len();
    let (width, height) = settings.output_size();
    let delay = Delay::from_saturating_duration(settings.frame_duration);
    let mut encoder: Option<GifEncoder<BufWriter<File>>> = None;
    let mut written = 0;
    let mut skipped = Vec::new();

    for (position, path) in paths.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(ExportError::Cancelled { written });
        }

        let index = position + 1;
        let frame = match source.decode(path) {
            Ok(frame) => frame,
            Err(e) => {
                let warning = DecodeWarning::new(index, path, &e);
                log::warn!("{warning}; leaving it out of the timelapse");
                observer.on_warning(&format!("{warning} (skipped in timelapse)"));
                skipped.push(warning);
                observer.on_progress(Progress { index, total });
                continue;
            }
        };

        let rgba = frame
            .resized(width, height)?
            .narrow()
            .to_dynamic_image()?
            .into_rgba8();

        if encoder.is_none() {
            *created = true;
            encoder = Some(open_gif(out)?);
        }
        if let Some(gif) = encoder.as_mut() {
            gif.encode_frame(AnimationFrame::from_parts(rgba, 0, 0, delay))
                .map_err(encode_error(out))?;
        }
        written += 1;
        observer.on_progress(Progress { index, total });
    }

    if written == 0 {
        return Err(ExportError::NoFrames(total));
    }
    // Dropping the encoder writes the GIF trailer.
    drop(encoder);
    log::info!("Wrote {} ({written} frames, {width}x{height})", out.display());

    Ok(TimelapseSummary {
        path: out.to_path_buf(),
        frames: written,
        skipped,
    })
}

fn open_gif(out: &Path) -> Result<GifEncoder<BufWriter<File>>, ExportError> {
    ensure_parent(out)?;
    let file = File::create(out).map_err(io_error(out))?;
    let mut encoder = GifEncoder::new_with_speed(BufWriter::new(file), GIF_SPEED);
    encoder
        .set_repeat(Repeat::Infinite)
        .map_err(encode_error(out))?;
    Ok(encoder)
}
