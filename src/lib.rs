//! streamgrab - segmented media acquisition
//!
//! This library resolves HLS playlists to an ordered segment list, fetches
//! the segments under bounded concurrency and remuxes them into one file
//! with ffmpeg, one task at a time.
//!
//! # Features
//!
//! - Variant playlist resolution (highest bandwidth wins)
//! - Batched segment downloads with per-segment retry
//! - Stream-copy assembly with audio bitstream repair
//! - Progressive download of non-playlist URLs
//! - Throttled, monotonic progress events
//! - Cancellation that tears down every open request and subprocess
//!
//! # Example
//!
//! ```no_run
//! use streamgrab::{Config, Supervisor, TaskOutcome, TaskRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let supervisor = Supervisor::with_http(Config::default())?;
//!     let request = TaskRequest::new(
//!         "1",
//!         "https://cdn.example/live/master.m3u8",
//!         "video.mp4",
//!     );
//!
//!     let handle = supervisor.submit(request)?;
//!     if let TaskOutcome::Completed(path) = handle.wait().await {
//!         println!("saved {}", path.display());
//!     }
//!     Ok(())
//! }
//! ```

pub mod assemble;
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod fs;
pub mod manifest;
pub mod net;
pub mod output;
pub mod progress;
pub mod resources;
pub mod task;

// Re-exports for convenience
pub use config::Config;
pub use error::{Error, Result};
pub use net::{HttpTransport, RequestHeaders, Transport};
pub use resources::{CancellableHandle, ResourceKind, ResourceSet};
pub use task::{
    CancelAck, Rejection, SourceKind, Supervisor, TaskEvent, TaskHandle, TaskId, TaskOutcome,
    TaskPhase, TaskRequest,
};
