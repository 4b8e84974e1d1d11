//! End-to-end runs of the library on synthetic image sequences.
//!
//! Frames are small PNGs written to a temp directory, so every run goes
//! through the real decoders and encoders.

use image::{AnimationDecoder, Rgb, RgbImage};
use star_trail::config::StackConfig;
use star_trail::imaging::{Frame, FrameShape, RustSource, SizePolicy};
use star_trail::pipeline::{self, ArtifactOutcome, OutputTargets};
use star_trail::progress::{CancelToken, NullObserver, StackEvent};
use star_trail::scan;
use star_trail::stack::{self, StackError, StackOptions};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use tempfile::TempDir;

/// A black frame with one bright "star" at `(x, y)`.
fn write_star(dir: &Path, name: &str, width: u32, height: u32, x: u32, y: u32) -> PathBuf {
    let path = dir.join(name);
    let mut img = RgbImage::new(width, height);
    img.put_pixel(x, y, Rgb([250, 240, 230]));
    img.save(&path).unwrap();
    path
}

/// Three frames with the star moving along the top row.
fn star_sequence(dir: &Path) -> Vec<PathBuf> {
    vec![
        write_star(dir, "frame_001.png", 8, 4, 1, 0),
        write_star(dir, "frame_002.png", 8, 4, 3, 0),
        write_star(dir, "frame_003.png", 8, 4, 5, 0),
    ]
}

fn pixel(frame: &Frame<u8>, x: u32, y: u32) -> [u8; 3] {
    [frame.sample(x, y, 0), frame.sample(x, y, 1), frame.sample(x, y, 2)]
}

#[test]
fn moving_star_leaves_a_trail() {
    let tmp = TempDir::new().unwrap();
    star_sequence(tmp.path());
    let manifest = scan::scan(tmp.path()).unwrap();

    let result = stack::stack(
        &manifest.files,
        &RustSource::default(),
        &StackOptions::default(),
        &mut NullObserver,
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(result.image.shape(), FrameShape::rgb(8, 4));
    for x in [1, 3, 5] {
        assert_eq!(pixel(&result.image, x, 0), [250, 240, 230], "star at x={x}");
    }
    for x in [0, 2, 4, 6, 7] {
        assert_eq!(pixel(&result.image, x, 0), [0, 0, 0], "sky at x={x}");
    }
}

#[test]
fn corrupt_frame_is_skipped_with_a_warning() {
    let tmp = TempDir::new().unwrap();
    star_sequence(tmp.path());
    std::fs::write(tmp.path().join("frame_002b.png"), b"not a png").unwrap();
    let manifest = scan::scan(tmp.path()).unwrap();
    assert_eq!(manifest.len(), 4);

    let result = stack::stack(
        &manifest.files,
        &RustSource::default(),
        &StackOptions::default(),
        &mut NullObserver,
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(result.frames, 4);
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].index, 3);
    assert_eq!(pixel(&result.image, 5, 0), [250, 240, 230]);
}

#[test]
fn different_sizes_need_a_resampling_policy() {
    let tmp = TempDir::new().unwrap();
    write_star(tmp.path(), "a.png", 8, 4, 0, 0);
    write_star(tmp.path(), "b.png", 16, 8, 0, 0);
    let manifest = scan::scan(tmp.path()).unwrap();
    let source = RustSource::default();

    let strict = stack::stack(
        &manifest.files,
        &source,
        &StackOptions::default(),
        &mut NullObserver,
        &CancelToken::new(),
    );
    assert!(matches!(strict, Err(StackError::ShapeMismatch { index: 2, .. })));

    let options = StackOptions {
        size_policy: SizePolicy::Largest,
        ..StackOptions::default()
    };
    let result = stack::stack(
        &manifest.files,
        &source,
        &options,
        &mut NullObserver,
        &CancelToken::new(),
    )
    .unwrap();
    assert_eq!(result.image.shape(), FrameShape::rgb(16, 8));
}

#[test]
fn png_frames_with_jpg_names_still_stack() {
    let tmp = TempDir::new().unwrap();
    for (name, x) in [("a.jpg", 1), ("b.jpg", 6)] {
        let mut img = RgbImage::new(8, 4);
        img.put_pixel(x, 2, Rgb([200, 200, 200]));
        img.save_with_format(tmp.path().join(name), image::ImageFormat::Png)
            .unwrap();
    }
    let manifest = scan::scan(tmp.path()).unwrap();

    let result = stack::stack(
        &manifest.files,
        &RustSource::default(),
        &StackOptions::default(),
        &mut NullObserver,
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(result.reference, FrameShape::rgb(8, 4));
    assert!(result.warnings.is_empty());
    assert_eq!(pixel(&result.image, 1, 2), [200, 200, 200]);
    assert_eq!(pixel(&result.image, 6, 2), [200, 200, 200]);
}

#[test]
fn full_run_writes_image_and_timelapse() {
    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    star_sequence(input.path());
    let manifest = scan::scan(input.path()).unwrap();

    let config = StackConfig::default();
    let targets = OutputTargets::from_config(out.path(), &config);
    let (mut tx, rx) = mpsc::channel::<StackEvent>();

    let report = pipeline::run(
        &manifest.files,
        &RustSource::default(),
        &StackOptions::from_config(&config),
        &targets,
        &mut tx,
        &CancelToken::new(),
    )
    .unwrap();
    drop(tx);

    assert!(report.is_complete());
    assert_eq!(
        report.image,
        ArtifactOutcome::Written(out.path().join("star_trail.jpg"))
    );
    assert_eq!(
        image::image_dimensions(out.path().join("star_trail.jpg")).unwrap(),
        (8, 4)
    );

    let gif = std::fs::File::open(out.path().join("star_trail_timelapse.gif")).unwrap();
    let frames = image::codecs::gif::GifDecoder::new(std::io::BufReader::new(gif))
        .unwrap()
        .into_frames()
        .collect_frames()
        .unwrap();
    assert_eq!(frames.len(), 3);

    let events: Vec<StackEvent> = rx.iter().collect();
    assert!(matches!(events.last(), Some(StackEvent::Complete(paths)) if paths.len() == 2));
    assert!(events.iter().any(|e| matches!(e, StackEvent::Preview(_))));
}

#[test]
fn empty_directory_fails_without_output() {
    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let manifest = scan::scan(input.path()).unwrap();

    let result = pipeline::run(
        &manifest.files,
        &RustSource::default(),
        &StackOptions::default(),
        &OutputTargets::from_config(out.path(), &StackConfig::default()),
        &mut NullObserver,
        &CancelToken::new(),
    );

    assert!(result.is_err());
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
}
