//! Download module.
//!
//! This module provides:
//! - Segment descriptors and their on-disk layout
//! - The batched segment fetcher with per-segment retry
//! - Progressive single-file downloads

pub mod direct;
pub mod fetcher;
pub mod retry;
pub mod segment;

pub use direct::download_direct;
pub use fetcher::{FetchOptions, FetchTally, SegmentFetcher};
pub use retry::{with_retry, RetryPolicy};
pub use segment::{ordered_paths, plan_segments, Segment, SegmentStatus};
