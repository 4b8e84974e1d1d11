//! Input discovery and manifest generation.
//!
//! Lists the regular files directly inside the input directory, keeps the
//! ones with a supported extension, and sorts them by path. The sorted list
//! is the processing order: the stack and the timelapse both follow it.
//!
//! ```text
//! night/
//! ├── star-trail.toml       # optional config, not an input
//! ├── IMG_0001.CR2          # camera RAW
//! ├── IMG_0002.CR2
//! ├── .DS_Store             # hidden, skipped
//! ├── notes.txt             # unsupported extension, skipped
//! └── darks/                # subdirectories are not searched
//! ```
//!
//! Extensions are matched case-insensitively: `jpg`, `jpeg`, `png`, `tif`,
//! `tiff`, `cr2`.

use crate::imaging::{SourceKind, source_kind};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error("Cannot read directory: {0}")]
    Walk(#[from] walkdir::Error),
}

/// The ordered list of inputs for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Manifest {
    pub root: PathBuf,
    pub files: Vec<PathBuf>,
}

impl Manifest {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Number of camera RAW files.
    pub fn raw_count(&self) -> usize {
        self.files
            .iter()
            .filter(|p| source_kind(p) == Some(SourceKind::Raw))
            .count()
    }
}

pub fn scan(root: &Path) -> Result<Manifest, ScanError> {
    scan_excluding(root, &[])
}

/// Like [`scan`], leaving out `exclude` (typically artifacts of an earlier
/// run written into the input directory).
pub fn scan_excluding(root: &Path, exclude: &[PathBuf]) -> Result<Manifest, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() || is_hidden(entry.path()) {
            continue;
        }
        let path = entry.into_path();
        if source_kind(&path).is_none() || exclude.contains(&path) {
            continue;
        }
        files.push(path);
    }
    files.sort();

    log::info!("Found {} input files in {}", files.len(), root.display());
    Ok(Manifest {
        root: root.to_path_buf(),
        files,
    })
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|name| name.to_string_lossy().starts_with('.'))
}
