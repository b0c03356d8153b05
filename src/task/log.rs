//! Bounded in-process log of supervisor activity.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use chrono::Local;
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

struct LogLine {
    text: String,
    progress: bool,
}

struct LogInner {
    lines: VecDeque<LogLine>,
    capacity: usize,
}

/// Append-only log that trims its oldest lines.
///
/// Progress lines overwrite the previous progress line instead of
/// accumulating, and are purged when a task ends.
#[derive(Clone)]
pub struct LogBuffer {
    inner: Arc<Mutex<LogInner>>,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LogInner {
                lines: VecDeque::with_capacity(capacity),
                capacity: capacity.max(1),
            })),
        }
    }

    pub fn info(&self, message: impl AsRef<str>) {
        tracing::info!("{}", message.as_ref());
        self.push(LogLevel::Info, message.as_ref(), false);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        tracing::error!("{}", message.as_ref());
        self.push(LogLevel::Error, message.as_ref(), false);
    }

    /// Record the latest progress line, replacing the previous one when it
    /// is the most recent entry.
    pub fn progress(&self, message: impl AsRef<str>) {
        tracing::debug!("{}", message.as_ref());
        self.push(LogLevel::Info, message.as_ref(), true);
    }

    /// Remove all progress lines.
    pub fn clear_progress(&self) {
        self.inner.lock().lines.retain(|line| !line.progress);
    }

    pub fn lines(&self) -> Vec<String> {
        self.inner
            .lock()
            .lines
            .iter()
            .map(|line| line.text.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, level: LogLevel, message: &str, progress: bool) {
        let stamp = Local::now().format("%m/%d %H:%M");
        let text = if progress {
            format!("[{}] [{}] progress: {}", stamp, level, message)
        } else {
            format!("[{}] [{}] {}", stamp, level, message)
        };

        let mut inner = self.inner.lock();
        if progress {
            if let Some(last) = inner.lines.back_mut() {
                if last.progress {
                    last.text = text;
                    return;
                }
            }
        }

        inner.lines.push_back(LogLine { text, progress });
        while inner.lines.len() > inner.capacity {
            inner.lines.pop_front();
        }
    }
}
