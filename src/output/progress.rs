//! Progress bars driven by task events.

use indicatif::{ProgressBar, ProgressStyle};

use crate::output::console::print_error;
use crate::task::{TaskEvent, TaskOutcome, TaskPhase};

/// How events are shown on the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Bars and spinners.
    Pretty,
    /// One JSON object per event on stdout.
    Json,
    /// Nothing but the final result.
    Quiet,
}

/// Create a spinner for phases without a known total.
pub fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {prefix:.bold} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_prefix(message.to_string());
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));
    spinner
}

/// Create a 0-100 bar for phases that report a percentage.
pub fn create_percent_bar(message: &str) -> ProgressBar {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix:.bold} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    bar.set_prefix(message.to_string());
    bar
}

/// Turns the event stream of one task into terminal output.
pub struct EventRenderer {
    mode: RenderMode,
    bar: Option<ProgressBar>,
}

impl EventRenderer {
    pub fn new(mode: RenderMode) -> Self {
        Self { mode, bar: None }
    }

    /// Show `event`. Terminal events are turned into the task outcome.
    pub fn render(&mut self, event: TaskEvent) -> Option<TaskOutcome> {
        if self.mode == RenderMode::Json {
            match event.to_json_line() {
                Ok(line) => println!("{}", line),
                Err(e) => print_error(&format!("Failed to encode event: {}", e)),
            }
        }

        match event {
            TaskEvent::Phase { phase, .. } => {
                self.start_phase(phase);
                None
            }
            TaskEvent::Progress { snapshot, .. } => {
                if let Some(bar) = &self.bar {
                    if let Some(percent) = snapshot.percent {
                        bar.set_position(u64::from(percent));
                    }
                    bar.set_message(snapshot.label);
                }
                None
            }
            TaskEvent::Completed { artifact, .. } => {
                self.finish();
                Some(TaskOutcome::Completed(artifact))
            }
            TaskEvent::Failed { error, .. } => {
                self.finish();
                Some(TaskOutcome::Failed(error))
            }
            TaskEvent::Cancelled { .. } => {
                self.finish();
                Some(TaskOutcome::Cancelled)
            }
        }
    }

    /// Clear any bar still on screen.
    pub fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }

    fn start_phase(&mut self, phase: TaskPhase) {
        self.finish();
        if self.mode != RenderMode::Pretty {
            return;
        }
        self.bar = Some(match phase {
            TaskPhase::Fetching => create_percent_bar("Fetching"),
            TaskPhase::Resolving => create_spinner("Resolving"),
            TaskPhase::Assembling => create_spinner("Assembling"),
            other => create_spinner(&other.to_string()),
        });
    }
}

impl Drop for EventRenderer {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::task::{ProgressSnapshot, TaskId};

    #[test]
    fn test_terminal_events_become_outcomes() {
        let mut renderer = EventRenderer::new(RenderMode::Quiet);
        let id = TaskId::from("1");

        assert!(renderer
            .render(TaskEvent::Phase {
                task_id: id.clone(),
                phase: TaskPhase::Fetching,
            })
            .is_none());
        assert!(renderer
            .render(TaskEvent::Progress {
                task_id: id.clone(),
                snapshot: ProgressSnapshot {
                    phase: TaskPhase::Fetching,
                    percent: Some(50),
                    label: "1/2 segments".into(),
                },
            })
            .is_none());

        let outcome = renderer.render(TaskEvent::Failed {
            task_id: id,
            error: Error::FFmpegNotFound,
        });
        assert!(matches!(outcome, Some(TaskOutcome::Failed(Error::FFmpegNotFound))));
    }
}
