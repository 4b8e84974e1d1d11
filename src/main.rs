use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use star_trail::config::{self, StackConfig};
use star_trail::imaging::{Frame, RustSource, SizePolicy};
use star_trail::pipeline::{self, OutputTargets, RunReport};
use star_trail::progress::{CancelToken, StackEvent};
use star_trail::stack::StackOptions;
use star_trail::{export, output, scan};
use std::path::{Path, PathBuf};
use std::sync::mpsc;

fn version_string() -> &'static str {
    let on_tag = env!("STAR_TRAIL_ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("STAR_TRAIL_GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "star-trail")]
#[command(about = "Stack night-sky photo sequences into star trail images")]
#[command(long_about = "\
Stack night-sky photo sequences into star trail images

Every pixel of the result is the brightest value that pixel reached anywhere
in the sequence, so moving stars draw arcs across a still landscape. The same
frames can also be assembled into a looping GIF timelapse.

Input directory:

  night/
  ├── star-trail.toml      # Optional config (see gen-config)
  ├── IMG_0001.CR2         # Camera RAW (Canon CR2)
  ├── IMG_0002.CR2
  └── IMG_0003.jpg         # JPEG, PNG and TIFF work too

Files are processed in sorted file-name order. Subdirectories and hidden files
are ignored. A frame that cannot be decoded is left blank and reported.

Run 'star-trail gen-config' to generate a documented star-trail.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Increase log output (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the frames that would be stacked, in order
    Scan(ScanArgs),
    /// Stack a directory of frames into a star trail image (and timelapse)
    Stack(StackArgs),
    /// Print a stock star-trail.toml with all options documented
    GenConfig,
}

#[derive(clap::Args)]
struct ScanArgs {
    /// Directory of frames
    input: PathBuf,

    /// Print the manifest as JSON
    #[arg(long)]
    json: bool,
}

#[derive(clap::Args)]
struct StackArgs {
    /// Directory of frames
    input: PathBuf,

    /// Output directory (defaults to the input directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// File name of the stacked image (.jpg, .png or .tif)
    #[arg(long, value_name = "NAME")]
    image: Option<String>,

    /// File name of the GIF timelapse
    #[arg(long, value_name = "NAME", conflicts_with = "no_gif")]
    gif: Option<String>,

    /// Skip the GIF timelapse
    #[arg(long)]
    no_gif: bool,

    /// Timelapse frame duration in milliseconds (10-1000)
    #[arg(long, value_name = "MS")]
    frame_duration: Option<u64>,

    /// How to handle frames of different sizes: first, smallest, largest
    #[arg(long, value_name = "POLICY")]
    size_policy: Option<SizePolicy>,

    /// Develop RAW files without the camera's white balance
    #[arg(long)]
    no_camera_wb: bool,

    /// Let RAW development brighten each frame automatically
    #[arg(long)]
    auto_bright: bool,

    /// Keep writing the latest preview of the stack to this image file
    #[arg(long, value_name = "FILE")]
    preview: Option<PathBuf>,

    /// Config file (defaults to <INPUT>/star-trail.toml when present)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl StackArgs {
    /// Command-line flags override config file values.
    fn apply(&self, config: &mut StackConfig) {
        if let Some(image) = &self.image {
            config.output.image = image.clone();
        }
        if let Some(gif) = &self.gif {
            config.gif.enabled = true;
            config.gif.filename = gif.clone();
        }
        if self.no_gif {
            config.gif.enabled = false;
        }
        if let Some(ms) = self.frame_duration {
            config.gif.frame_duration_ms = ms;
        }
        if let Some(policy) = self.size_policy {
            config.output.size_policy = policy;
        }
        if self.no_camera_wb {
            config.raw.use_camera_wb = false;
        }
        if self.auto_bright {
            config.raw.no_auto_bright = false;
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Scan(args) => {
            let manifest = scan::scan(&args.input)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&manifest)?);
            } else {
                output::print_scan_output(&manifest);
            }
        }
        Command::Stack(args) => {
            let mut config = config::load_config(args.config.as_deref(), &args.input)?;
            args.apply(&mut config);
            config.validate()?;

            let output_dir = args.output.clone().unwrap_or_else(|| args.input.clone());
            let targets = OutputTargets::from_config(&output_dir, &config);
            let exclude: Vec<PathBuf> = std::iter::once(targets.image.clone())
                .chain(targets.timelapse.clone())
                .chain(args.preview.clone())
                .collect();
            let manifest = scan::scan_excluding(&args.input, &exclude)?;

            init_thread_pool(&config.processing);
            let options = StackOptions::from_config(&config);
            let report = run_stack(&manifest.files, &options, &targets, args.preview.as_deref())?;

            match report {
                Some(report) => {
                    output::print_run_report(&report);
                    if !report.is_complete() {
                        return Err("some outputs could not be written".into());
                    }
                }
                // Already reported by the display loop.
                None => std::process::exit(1),
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Run the pipeline on a worker thread while this thread drives the display.
///
/// Returns `None` when the run failed before any artifact was attempted.
fn run_stack(
    paths: &[PathBuf],
    options: &StackOptions,
    targets: &OutputTargets,
    preview: Option<&Path>,
) -> Result<Option<RunReport>, Box<dyn std::error::Error>> {
    let source = RustSource::new(options.raw);
    let cancel = CancelToken::new();
    let (tx, rx) = mpsc::channel::<StackEvent>();

    let bar = ProgressBar::new(paths.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{msg:18} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("=> "),
    );

    let result = std::thread::scope(|s| {
        let worker = s.spawn(move || {
            let mut tx = tx;
            pipeline::run(paths, &source, options, targets, &mut tx, &cancel)
        });

        for event in rx {
            match &event {
                StackEvent::Stage(stage) => {
                    bar.set_message(output::stage_label(*stage));
                    bar.set_position(0);
                }
                StackEvent::Progress(progress) => {
                    bar.set_length(progress.total as u64);
                    bar.set_position(progress.index as u64);
                }
                StackEvent::Preview(frame) => {
                    if let Some(path) = preview {
                        write_preview(frame, path, options.jpeg_quality);
                    }
                }
                StackEvent::Warning(_) | StackEvent::Fatal(_) => {
                    for line in output::format_stack_event(&event) {
                        print_above(&bar, &line);
                    }
                }
                StackEvent::Complete(_) => bar.finish_and_clear(),
            }
        }
        worker.join()
    });
    bar.finish_and_clear();

    match result {
        Ok(Ok(report)) => Ok(Some(report)),
        Ok(Err(e)) => {
            log::debug!("Run failed: {e:?}");
            Ok(None)
        }
        Err(_) => Err("stacking worker panicked".into()),
    }
}

/// Print above the bar, or to stderr when there is no terminal to draw on.
fn print_above(bar: &ProgressBar, line: &str) {
    if bar.is_hidden() {
        eprintln!("{line}");
    } else {
        bar.println(line);
    }
}

fn write_preview(frame: &Frame<u8>, path: &Path, quality: u8) {
    if let Err(e) = export::write_image(frame, path, quality) {
        log::warn!("Could not write preview {}: {e}", path.display());
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores: the config can only lower it.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
