//! Progress module.
//!
//! Provides:
//! - The throttled progress reporter
//! - Size, throughput and percentage labels

pub mod format;
pub mod reporter;

pub use format::{
    duration_percent, format_clock, format_megabytes, percent_of, remux_label, segments_label,
    transfer_label,
};
pub use reporter::ProgressReporter;
