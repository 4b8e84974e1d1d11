//! CLI output formatting for scan and stack commands.
//!
//! # Output Format
//!
//! ## Scan
//!
//! ```text
//! Inputs (3 files, 2 RAW)
//! 001 IMG_0001.CR2
//! 002 IMG_0002.CR2
//! 003 IMG_0003.jpg
//!
//! Config
//!     star-trail.toml
//! ```
//!
//! ## Stack
//!
//! While the run is going, stage changes, warnings and errors are printed
//! above the progress bar:
//!
//! ```text
//! Stacking
//!     Warning: Could not decode IMG_0042.CR2: ...
//! Writing image
//! Writing timelapse
//! ```
//!
//! followed by a summary:
//!
//! ```text
//! Stacked 120 frames at 5184x3456x3
//!     1 frame could not be decoded and was left blank
//!         042 IMG_0042.CR2: Raw decode failed: ...
//! Image → night/star_trail.jpg
//! Timelapse → night/star_trail_timelapse.gif (119 frames)
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::config::CONFIG_FILE_NAME;
use crate::pipeline::{ArtifactOutcome, RunReport};
use crate::progress::{Stage, StackEvent};
use crate::scan::Manifest;
use std::path::Path;

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

pub fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::Stacking => "Stacking",
        Stage::WritingImage => "Writing image",
        Stage::WritingTimelapse => "Writing timelapse",
    }
}

// ============================================================================
// Scan
// ============================================================================

/// Format the manifest as a numbered file list.
pub fn format_scan_output(manifest: &Manifest) -> Vec<String> {
    let mut lines = Vec::new();

    let raw = manifest.raw_count();
    let header = if raw > 0 {
        format!("Inputs ({}, {raw} RAW)", plural(manifest.len(), "file"))
    } else {
        format!("Inputs ({})", plural(manifest.len(), "file"))
    };
    lines.push(header);

    for (i, path) in manifest.files.iter().enumerate() {
        lines.push(format!("{} {}", format_index(i + 1), file_name(path)));
    }

    if manifest.root.join(CONFIG_FILE_NAME).is_file() {
        lines.push(String::new());
        lines.push("Config".to_string());
        lines.push(format!("{}{CONFIG_FILE_NAME}", indent(1)));
    }

    lines
}

/// Print scan output to stdout.
pub fn print_scan_output(manifest: &Manifest) {
    for line in format_scan_output(manifest) {
        println!("{}", line);
    }
}

// ============================================================================
// Stack
// ============================================================================

/// Format a single stack event as display lines.
///
/// Previews produce no text.
pub fn format_stack_event(event: &StackEvent) -> Vec<String> {
    match event {
        StackEvent::Stage(stage) => vec![stage_label(*stage).to_string()],
        StackEvent::Progress(progress) => vec![format!(
            "{}Frame {}/{} ({}%)",
            indent(1),
            progress.index,
            progress.total,
            progress.percent()
        )],
        StackEvent::Preview(_) => Vec::new(),
        StackEvent::Warning(message) => vec![format!("{}Warning: {message}", indent(1))],
        StackEvent::Fatal(message) => vec![format!("Error: {message}")],
        StackEvent::Complete(artifacts) if artifacts.is_empty() => {
            vec!["Done, no files written".to_string()]
        }
        StackEvent::Complete(artifacts) => {
            vec![format!("Done, wrote {}", plural(artifacts.len(), "file"))]
        }
    }
}

fn format_outcome(label: &str, outcome: &ArtifactOutcome, detail: Option<String>) -> String {
    match outcome {
        ArtifactOutcome::Written(path) => match detail {
            Some(detail) => format!("{label} \u{2192} {} ({detail})", path.display()),
            None => format!("{label} \u{2192} {}", path.display()),
        },
        ArtifactOutcome::Failed { path, error } => {
            format!("{label} failed: {}: {error}", path.display())
        }
    }
}

/// Format the end-of-run summary: frame count, decode problems, artifacts.
pub fn format_run_report(report: &RunReport) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push(format!(
        "Stacked {} at {}",
        plural(report.frames, "frame"),
        report.reference
    ));

    if !report.warnings.is_empty() {
        let n = report.warnings.len();
        let verb = if n == 1 { "was" } else { "were" };
        lines.push(format!(
            "{}{} could not be decoded and {verb} left blank",
            indent(1),
            plural(n, "frame")
        ));
        for warning in &report.warnings {
            lines.push(format!(
                "{}{} {}: {}",
                indent(2),
                format_index(warning.index),
                warning.file_name(),
                warning.cause
            ));
        }
    }

    lines.push(format_outcome("Image", &report.image, None));
    if let Some(timelapse) = &report.timelapse {
        let detail = Some(plural(report.timelapse_frames, "frame"));
        lines.push(format_outcome("Timelapse", timelapse, detail));
    }
    lines
}

/// Print the run summary to stdout.
pub fn print_run_report(report: &RunReport) {
    for line in format_run_report(report) {
        println!("{}", line);
    }
}
