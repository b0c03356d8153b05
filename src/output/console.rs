//! Console output utilities.

use console::style;

use crate::task::TaskRequest;

/// Print an info message.
pub fn print_info(message: &str) {
    eprintln!("{} {}", style("INFO").cyan().bold(), message);
}

/// Print a warning message.
pub fn print_warning(message: &str) {
    eprintln!("{} {}", style("WARN").yellow().bold(), message);
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", style("ERROR").red().bold(), message);
}

/// Print the application banner.
pub fn print_banner() {
    let banner = r#"
╔═══════════════════════════════════════════════════════╗
║     streamgrab                                        ║
║     segmented media downloader                        ║
╚═══════════════════════════════════════════════════════╝
"#;
    eprintln!("{}", style(banner).cyan());
}

/// Print what is about to be fetched.
pub fn print_request_summary(request: &TaskRequest, concurrency: usize) {
    eprintln!();
    eprintln!("{}", style("Task:").bold());
    eprintln!("  Id:          {}", request.task_id);
    eprintln!("  Source:      {}", request.url);
    eprintln!("  Kind:        {:?}", request.kind.resolve(&request.url));
    eprintln!("  Output:      {}", request.output.display());
    eprintln!("  Concurrency: {}", concurrency);
    eprintln!();
}
