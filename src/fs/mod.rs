//! Filesystem module.
//!
//! Provides:
//! - Per-task work directories
//! - Segment and artifact file naming
//! - Publishing the assembled artifact

pub mod naming;
pub mod paths;

pub use naming::{index_width, sanitize_path_component, segment_file_name, staged_file_name};
pub use paths::{publish_artifact, remove_work_dir, task_work_dir};
