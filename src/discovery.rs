// src/discovery.rs

//! Input validation and work item discovery. Everything here is cheap and
//! runs before any watermark remover is constructed.

use crate::data_model::{output_file_name, WorkItem};
use crate::error::{BatchError, Result};
use globset::{GlobBuilder, GlobMatcher};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_PATTERN: &str = "*.mp4";

/// Replaces a leading `~` with `$HOME`.
pub fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    path.to_path_buf()
}

/// Resolves `path` against the working directory without touching the
/// filesystem.
pub fn absolutize(path: &Path) -> Result<PathBuf> {
    let expanded = expand_home(path);
    if expanded.is_absolute() {
        Ok(expanded)
    } else {
        Ok(std::env::current_dir()?.join(expanded))
    }
}

/// Checks that the input folder exists and is a directory, returning its
/// canonical form.
pub fn validate_input_dir(path: &Path) -> Result<PathBuf> {
    let resolved = absolutize(path)?;
    if !resolved.exists() {
        return Err(BatchError::InputNotFound(resolved));
    }
    if !resolved.is_dir() {
        return Err(BatchError::InputNotADirectory(resolved));
    }
    Ok(fs::canonicalize(&resolved)?)
}

/// Compiles a file-name glob. `{a,b}` alternation is supported, so
/// `*.{mp4,mov,avi}` matches all three extensions.
pub fn compile_pattern(pattern: &str) -> Result<GlobMatcher> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|source| BatchError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
}

/// Lists the regular files directly inside `input_dir` whose name matches
/// `pattern`, sorted by full path string. An empty result is not an error.
pub fn discover(input_dir: &Path, pattern: &str, output_dir: &Path) -> Result<Vec<WorkItem>> {
    let matcher = compile_pattern(pattern)?;

    let mut inputs: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(input_dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .file_name()
            .map(|name| matcher.is_match(Path::new(name)))
            .unwrap_or(false);
        if matches {
            inputs.push(path);
        } else {
            debug!(path = %path.display(), "Skipping non-matching entry");
        }
    }
    inputs.sort_by(|a, b| a.as_os_str().cmp(b.as_os_str()));

    info!(
        input_dir = %input_dir.display(),
        pattern,
        found = inputs.len(),
        "Discovery finished"
    );
    Ok(inputs
        .into_iter()
        .map(|input| WorkItem::new(input, output_dir))
        .collect())
}

/// Fails if two items would be written to the same output file, comparing
/// names case-insensitively so case-insensitive filesystems are covered too.
pub fn check_output_collisions(items: &[WorkItem]) -> Result<()> {
    let mut seen: HashMap<String, &WorkItem> = HashMap::with_capacity(items.len());
    for item in items {
        let key = output_file_name(item.input_path()).to_lowercase();
        if let Some(previous) = seen.get(&key) {
            return Err(BatchError::OutputCollision {
                first: previous.file_name(),
                second: item.file_name(),
                output: item.output_path().display().to_string(),
            });
        }
        seen.insert(key, item);
    }
    Ok(())
}
