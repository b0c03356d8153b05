//! Concat demuxer reference lists.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// File name of the list inside the work directory.
pub const CONCAT_LIST_NAME: &str = "concat.txt";

/// Render one `file '<path>'` line per segment, in the given order.
pub fn render_concat_list(segments: &[PathBuf]) -> Result<String> {
    let mut list = String::new();
    for segment in segments {
        let path = segment.to_str().ok_or_else(|| {
            Error::Internal(format!("Segment path is not valid UTF-8: {}", segment.display()))
        })?;
        list.push_str("file '");
        list.push_str(&path.replace('\'', r"'\''"));
        list.push_str("'\n");
    }
    Ok(list)
}

/// Write the list for `segments` into `work_dir` and return its path.
///
/// Relative segment paths are made absolute so ffmpeg does not resolve
/// them against the list's own directory.
pub async fn write_concat_list(segments: &[PathBuf], work_dir: &Path) -> Result<PathBuf> {
    let mut absolute = Vec::with_capacity(segments.len());
    for segment in segments {
        absolute.push(tokio::fs::canonicalize(segment).await?);
    }

    let list_path = work_dir.join(CONCAT_LIST_NAME);
    tokio::fs::write(&list_path, render_concat_list(&absolute)?).await?;
    Ok(list_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_keeps_order_and_escapes_quotes() {
        let list = render_concat_list(&[
            PathBuf::from("/w/segment_00001.ts"),
            PathBuf::from("/w/it's/segment_00000.ts"),
        ])
        .unwrap();

        assert_eq!(
            list,
            "file '/w/segment_00001.ts'\nfile '/w/it'\\''s/segment_00000.ts'\n"
        );
    }

    #[tokio::test]
    async fn test_write_uses_absolute_paths() {
        let dir = tempfile::tempdir().unwrap();
        let seg = dir.path().join("segment_00000.ts");
        std::fs::write(&seg, b"x").unwrap();

        let list_path = write_concat_list(&[seg.clone()], dir.path()).await.unwrap();
        let content = std::fs::read_to_string(&list_path).unwrap();

        assert_eq!(list_path.file_name().unwrap(), CONCAT_LIST_NAME);
        let canonical = std::fs::canonicalize(&seg).unwrap();
        assert_eq!(content, format!("file '{}'\n", canonical.display()));
    }

    #[tokio::test]
    async fn test_missing_segment_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("segment_00009.ts");

        assert!(write_concat_list(&[missing], dir.path()).await.is_err());
    }
}
