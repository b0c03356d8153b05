//! Work directory and artifact placement.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs;

use crate::error::Result;
use crate::fs::naming::sanitize_path_component;

/// Prefix shared by all per-task work directories.
const WORK_DIR_PREFIX: &str = ".streamgrab";

/// Pause before removing a work directory a second time.
const REMOVE_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Unique work directory for a task under `root` (not created).
pub fn task_work_dir(root: &Path, task_id: &str) -> Result<PathBuf> {
    let component = sanitize_path_component(task_id)?;
    let unique = uuid::Uuid::new_v4().simple().to_string();
    Ok(root.join(format!("{}_{}_{}", WORK_DIR_PREFIX, component, &unique[..8])))
}

/// Remove a work directory and everything in it.
///
/// A write that was already running when its job was aborted can land
/// during the first removal, so a failure is retried once. Best effort:
/// a second failure is logged and reported as `false`.
pub async fn remove_work_dir(dir: &Path) -> bool {
    let mut retried = false;
    loop {
        match fs::remove_dir_all(dir).await {
            Ok(()) => return true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return true,
            Err(e) if !retried => {
                tracing::debug!("Retrying removal of {}: {}", dir.display(), e);
                retried = true;
                tokio::time::sleep(REMOVE_RETRY_DELAY).await;
            }
            Err(e) => {
                tracing::warn!("Failed to remove work directory {}: {}", dir.display(), e);
                return false;
            }
        }
    }
}

/// Move a finished artifact to its final location, replacing any file
/// already there.
pub async fn publish_artifact(staged: &Path, output: &Path) -> Result<()> {
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    match fs::remove_file(output).await {
        Ok(()) => tracing::debug!("Replaced existing {}", output.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    if let Err(e) = fs::rename(staged, output).await {
        // Rename fails across filesystems
        tracing::debug!("Rename failed ({}), copying instead", e);
        fs::copy(staged, output).await?;
        fs::remove_file(staged).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_work_dir() {
        let dir = task_work_dir(Path::new("/videos"), "12/3").unwrap();
        let name = dir.file_name().unwrap().to_str().unwrap();

        assert_eq!(dir.parent().unwrap(), Path::new("/videos"));
        assert!(name.starts_with(".streamgrab_12_3_"));
        assert_ne!(dir, task_work_dir(Path::new("/videos"), "12/3").unwrap());
        assert!(task_work_dir(Path::new("/videos"), "..").is_err());
    }

    #[tokio::test]
    async fn test_publish_replaces_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let staged = dir.path().join("assembled.mp4");
        let output = dir.path().join("out").join("final.mp4");

        std::fs::create_dir_all(output.parent().unwrap()).unwrap();
        std::fs::write(&output, b"stale content from a previous run").unwrap();
        std::fs::write(&staged, b"fresh").unwrap();

        publish_artifact(&staged, &output).await.unwrap();

        assert_eq!(std::fs::read(&output).unwrap(), b"fresh");
        assert!(!staged.exists());
    }

    #[tokio::test]
    async fn test_remove_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("work");
        std::fs::create_dir_all(work.join("nested")).unwrap();
        std::fs::write(work.join("segment_00000.ts"), b"x").unwrap();

        assert!(remove_work_dir(&work).await);
        assert!(!work.exists());
        assert!(remove_work_dir(&work).await);
    }
}
