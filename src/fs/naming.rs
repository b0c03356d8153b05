//! File and directory naming.

use std::path::Path;

use crate::error::{Error, Result};

/// Minimum digits in a segment file name.
const MIN_INDEX_WIDTH: usize = 5;

/// Extension used for the staged artifact when the output has none.
const DEFAULT_CONTAINER: &str = "mp4";

/// Sanitize a caller-supplied value (e.g. a task id) for use in a path.
///
/// Separators and reserved characters become `_`; traversal patterns and
/// null bytes are rejected.
pub fn sanitize_path_component(name: &str) -> Result<String> {
    // Reject path traversal attempts
    if name.contains("..") {
        return Err(Error::InvalidFilename(format!(
            "Path traversal detected: '{}'",
            name
        )));
    }

    // Reject null bytes
    if name.contains('\0') {
        return Err(Error::InvalidFilename(format!(
            "Null bytes not allowed: '{}'",
            name
        )));
    }

    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | ' ' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    // Reject empty or whitespace-only names
    if sanitized.trim_matches('_').is_empty() {
        return Err(Error::InvalidFilename(
            "Path component cannot be empty or whitespace-only".to_string(),
        ));
    }

    Ok(sanitized)
}

/// Digits needed so every index of `total` segments sorts lexicographically.
pub fn index_width(total: usize) -> usize {
    let largest = total.saturating_sub(1);
    largest.to_string().len().max(MIN_INDEX_WIDTH)
}

/// Zero-padded segment file name, e.g. `segment_00042.ts`.
pub fn segment_file_name(index: usize, width: usize) -> String {
    format!("segment_{:0width$}.ts", index, width = width)
}

/// Name of the staged artifact inside the work directory. Keeps the output's
/// extension so the remuxer picks the same container.
pub fn staged_file_name(output: &Path) -> String {
    let ext = output
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .unwrap_or(DEFAULT_CONTAINER);
    format!("assembled.{}", ext)
}
