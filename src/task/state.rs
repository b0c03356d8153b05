//! Task identity, lifecycle phases and progress snapshots.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::resources::ResourceSet;

/// Caller-assigned task identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A random identifier for callers that do not assign one.
    pub fn generate() -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        Self(id[..8].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPhase {
    #[default]
    Idle,
    Resolving,
    Fetching,
    Assembling,
    Completed,
    Failed,
    Cancelled,
}

impl TaskPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskPhase::Completed | TaskPhase::Failed | TaskPhase::Cancelled
        )
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_advance_to(&self, next: TaskPhase) -> bool {
        use TaskPhase::*;
        match (self, next) {
            (Idle, Resolving)
            | (Resolving, Fetching)
            | (Fetching, Assembling)
            | (Assembling, Completed) => true,
            (current, Failed | Cancelled) => !current.is_terminal() && *current != Idle,
            _ => false,
        }
    }
}

impl fmt::Display for TaskPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskPhase::Idle => write!(f, "idle"),
            TaskPhase::Resolving => write!(f, "resolving"),
            TaskPhase::Fetching => write!(f, "fetching"),
            TaskPhase::Assembling => write!(f, "assembling"),
            TaskPhase::Completed => write!(f, "completed"),
            TaskPhase::Failed => write!(f, "failed"),
            TaskPhase::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Latest observable progress of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub phase: TaskPhase,
    /// `None` when the total is unknown.
    pub percent: Option<u8>,
    pub label: String,
}

/// Progress slot shared between a task and its reporter.
pub type ProgressCell = Arc<Mutex<Option<ProgressSnapshot>>>;

/// The single non-terminal task held by the supervisor.
pub struct Task {
    pub id: TaskId,
    pub url: String,
    phase: TaskPhase,
    pub cancel: CancellationToken,
    pub resources: ResourceSet,
    pub progress: ProgressCell,
    /// Fired once teardown has finished and the slot is free.
    pub finished: CancellationToken,
    pub started_at: DateTime<Local>,
}

impl Task {
    /// Create an admitted task; it starts out resolving.
    pub fn admit(id: TaskId, url: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
            phase: TaskPhase::Resolving,
            cancel: CancellationToken::new(),
            resources: ResourceSet::new(),
            progress: Arc::new(Mutex::new(None)),
            finished: CancellationToken::new(),
            started_at: Local::now(),
        }
    }

    pub fn phase(&self) -> TaskPhase {
        self.phase
    }

    /// Move to `next`, rejecting transitions the state machine forbids.
    pub fn advance(&mut self, next: TaskPhase) -> Result<()> {
        if !self.phase.can_advance_to(next) {
            return Err(Error::Internal(format!(
                "Task {} cannot move from {} to {}",
                self.id, self.phase, next
            )));
        }
        self.phase = next;
        Ok(())
    }

    /// Latest progress label, if any.
    pub fn progress_label(&self) -> Option<String> {
        self.progress.lock().as_ref().map(|p| p.label.clone())
    }
}
