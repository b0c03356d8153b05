//! Segment descriptors owned by a task run.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::fs::naming::{index_width, segment_file_name};
use crate::manifest::Manifest;

/// Fetch state of one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentStatus {
    Pending,
    InFlight,
    Done,
    Failed,
}

/// One media segment. The index is its playback position.
#[derive(Debug, Clone)]
pub struct Segment {
    index: usize,
    url: String,
    path: PathBuf,
    status: SegmentStatus,
    attempts: u32,
    bytes: u64,
}

impl Segment {
    pub fn new(index: usize, url: impl Into<String>, path: PathBuf) -> Self {
        Self {
            index,
            url: url.into(),
            path,
            status: SegmentStatus::Pending,
            attempts: 0,
            bytes: 0,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn status(&self) -> SegmentStatus {
        self.status
    }

    /// Attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub(crate) fn mark_in_flight(&mut self) {
        self.status = SegmentStatus::InFlight;
    }

    pub(crate) fn mark_done(&mut self, attempts: u32, bytes: u64) {
        self.status = SegmentStatus::Done;
        self.attempts = attempts;
        self.bytes = bytes;
    }

    pub(crate) fn mark_failed(&mut self, attempts: u32) {
        self.status = SegmentStatus::Failed;
        self.attempts = attempts;
    }
}

/// Lay out the manifest's segments as files in `dir`, in manifest order.
pub fn plan_segments(manifest: &Manifest, dir: &Path) -> Vec<Segment> {
    let width = index_width(manifest.len());
    manifest
        .segment_urls
        .iter()
        .enumerate()
        .map(|(index, url)| Segment::new(index, url.clone(), dir.join(segment_file_name(index, width))))
        .collect()
}

/// Local paths in playback order. Every segment must be done.
pub fn ordered_paths(segments: &[Segment]) -> Result<Vec<PathBuf>> {
    if let Some(pending) = segments.iter().find(|s| s.status != SegmentStatus::Done) {
        return Err(Error::Internal(format!(
            "Segment {} is {:?}, cannot assemble",
            pending.index, pending.status
        )));
    }

    let mut ordered: Vec<&Segment> = segments.iter().collect();
    ordered.sort_by_key(|s| s.index);
    Ok(ordered.into_iter().map(|s| s.path.clone()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(count: usize) -> Manifest {
        Manifest {
            url: "https://cdn.example/master.m3u8".into(),
            leaf_url: "https://cdn.example/index.m3u8".into(),
            segment_urls: (0..count)
                .map(|i| format!("https://cdn.example/{}.ts", i))
                .collect(),
            duration: None,
        }
    }

    #[test]
    fn test_plan_keeps_manifest_order() {
        let segments = plan_segments(&manifest(3), Path::new("/work"));

        assert_eq!(segments.len(), 3);
        assert_eq!(segments[2].index(), 2);
        assert_eq!(segments[2].url(), "https://cdn.example/2.ts");
        assert_eq!(segments[2].path(), Path::new("/work/segment_00002.ts"));
        assert!(segments.iter().all(|s| s.status() == SegmentStatus::Pending));
    }

    #[test]
    fn test_ordered_paths_requires_all_done() {
        let mut segments = plan_segments(&manifest(2), Path::new("/work"));
        segments[1].mark_done(1, 10);
        assert!(ordered_paths(&segments).is_err());

        segments[0].mark_done(2, 10);
        segments.reverse();
        let paths = ordered_paths(&segments).unwrap();
        assert_eq!(paths[0], PathBuf::from("/work/segment_00000.ts"));
        assert_eq!(paths[1], PathBuf::from("/work/segment_00001.ts"));
    }
}
