//! End-of-task reporting.

use std::path::Path;
use std::time::Duration;

use console::style;

use crate::error::Error;
use crate::progress::format_megabytes;
use crate::task::TaskOutcome;

/// Print how the task ended.
pub fn print_outcome(outcome: &TaskOutcome, elapsed: Duration) {
    match outcome {
        TaskOutcome::Completed(path) => print_completed(path, elapsed),
        TaskOutcome::Cancelled => {
            eprintln!(
                "{} Task cancelled after {:.1}s",
                style("CANCELLED").yellow().bold(),
                elapsed.as_secs_f64()
            );
        }
        TaskOutcome::Failed(error) => print_failure(error),
    }
}

fn print_completed(path: &Path, elapsed: Duration) {
    let size = std::fs::metadata(path).map(|m| m.len()).ok();

    eprintln!();
    eprintln!("{}", style("═".repeat(50)).dim());
    eprintln!("{} {}", style("Saved").green().bold(), path.display());
    if let Some(size) = size {
        eprintln!("  Size: {}", format_megabytes(size));
    }
    eprintln!("  Time: {:.1}s", elapsed.as_secs_f64());
    eprintln!("{}", style("═".repeat(50)).dim());
}

fn print_failure(error: &Error) {
    eprintln!("{} {}", style("FAILED").red().bold(), error);
    if let Error::Assembly {
        diagnostics: Some(diagnostics),
        ..
    } = error
    {
        eprintln!("{}", style("ffmpeg output:").dim());
        for line in diagnostics.lines() {
            eprintln!("  {}", style(line).dim());
        }
    }
}
