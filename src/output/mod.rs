//! Output module for console output and progress.
//!
//! Provides:
//! - Colored console output
//! - Progress bars fed by task events
//! - End-of-task summaries

pub mod console;
pub mod progress;
pub mod summary;

pub use console::{print_banner, print_error, print_info, print_request_summary, print_warning};
pub use progress::{create_percent_bar, create_spinner, EventRenderer, RenderMode};
pub use summary::print_outcome;
