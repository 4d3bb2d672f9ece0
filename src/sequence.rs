//! Image sequence discovery.
//!
//! **Why**: hosts hand the engine a single path that stands for many frames
//! (`shot.%04d.png`, `shot.*.png`, or just `shot.0001.png`). Discovery
//! expands that into the ordered frame list the loader iterates.
//!
//! **Used by**: engine `load_media` for `MediaKind::ImageSequence`.
//!
//! # Detection
//!
//! 1. printf-style patterns (`%04d`) are converted to a glob and expanded
//! 2. glob patterns (`*`) are expanded directly
//! 3. a plain file is checked for a trailing digit group; siblings matching
//!    the same stem pattern form the sequence, otherwise it is a single
//!    still frame
//!
//! Frame order is numeric on the last digit group of the file stem, falling
//! back to lexicographic order when no digits are present.

use log::info;
use regex::Regex;
use std::path::{Path, PathBuf};

use crate::error::PreviewError;

/// Expand one source path into the ordered list of frame files.
///
/// Returns `LoadFailure` when the pattern matches nothing or the file does
/// not exist; a one-element list is a valid single-still sequence.
pub fn expand_source(path: &Path) -> Result<Vec<PathBuf>, PreviewError> {
    let text = path.to_string_lossy().to_string();

    if text.contains('%') {
        let glob_pattern = printf_to_glob(&text)?;
        expand_glob(&glob_pattern)
    } else if text.contains('*') {
        expand_glob(&text)
    } else {
        expand_plain_file(path)
    }
}

/// Convert `frame.%04d.png` to `frame.*.png`.
fn printf_to_glob(pattern: &str) -> Result<String, PreviewError> {
    let re = Regex::new(r"%0?\d*d")
        .map_err(|e| PreviewError::LoadFailure(format!("pattern regex: {}", e)))?;
    if !re.is_match(pattern) {
        return Err(PreviewError::LoadFailure(format!(
            "not a printf-style sequence pattern: {}",
            pattern
        )));
    }
    Ok(re.replace_all(pattern, "*").to_string())
}

/// Glob and order frames numerically.
fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>, PreviewError> {
    let paths = glob::glob(pattern)
        .map_err(|e| PreviewError::LoadFailure(format!("bad glob '{}': {}", pattern, e)))?;

    let mut files: Vec<PathBuf> = paths.filter_map(Result::ok).filter(|p| p.is_file()).collect();

    if files.is_empty() {
        return Err(PreviewError::LoadFailure(format!(
            "no files match sequence pattern: {}",
            pattern
        )));
    }

    sort_by_frame_number(&mut files);
    info!("Sequence: {} frames from pattern {}", files.len(), pattern);
    Ok(files)
}

/// A plain file: either one frame of a numbered sequence, or a single still.
fn expand_plain_file(path: &Path) -> Result<Vec<PathBuf>, PreviewError> {
    if !path.is_file() {
        return Err(PreviewError::LoadFailure(format!(
            "file not found: {}",
            path.display()
        )));
    }

    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");

    // Last digit group in the stem is the frame number by convention.
    let re = Regex::new(r"\d+").expect("static regex");
    let Some(last) = re.find_iter(stem).last() else {
        info!("Single still frame: {}", path.display());
        return Ok(vec![path.to_path_buf()]);
    };

    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
    let pattern_stem = format!("{}*{}", &stem[..last.start()], &stem[last.end()..]);
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let pattern = if ext.is_empty() {
        dir.join(pattern_stem)
    } else {
        dir.join(format!("{}.{}", pattern_stem, ext))
    };

    let found = expand_glob(&pattern.to_string_lossy())?;
    // A lone numbered file is still a valid one-frame sequence.
    Ok(found)
}

/// Numeric sort on the last digit group of each stem; files without digits
/// keep lexicographic order among themselves.
fn sort_by_frame_number(files: &mut [PathBuf]) {
    let re = Regex::new(r"\d+").expect("static regex");
    files.sort_by_key(|p| {
        let stem = p.file_stem().and_then(|s| s.to_str()).unwrap_or("").to_string();
        let num = re
            .find_iter(&stem)
            .last()
            .and_then(|m| m.as_str().parse::<u64>().ok());
        (num, stem)
    });
}

/// Frame number parsed from a path's stem, when present. The loader uses
/// this only for log lines; ordering authority is the expanded list itself.
pub fn frame_number(path: &Path) -> Option<u64> {
    let stem = path.file_stem()?.to_str()?;
    let re = Regex::new(r"\d+").ok()?;
    re.find_iter(stem).last()?.as_str().parse().ok()
}
