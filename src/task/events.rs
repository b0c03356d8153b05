//! Typed status events delivered to the submitter of a task.

use std::path::PathBuf;

use futures::stream::{self, Stream};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::task::state::{ProgressSnapshot, TaskId, TaskPhase};

/// How a task ended. Exactly one is produced per admitted task.
#[derive(Debug)]
pub enum TaskOutcome {
    Completed(PathBuf),
    Failed(Error),
    Cancelled,
}

impl TaskOutcome {
    pub fn phase(&self) -> TaskPhase {
        match self {
            TaskOutcome::Completed(_) => TaskPhase::Completed,
            TaskOutcome::Failed(_) => TaskPhase::Failed,
            TaskOutcome::Cancelled => TaskPhase::Cancelled,
        }
    }
}

/// A status event of one task.
#[derive(Debug)]
pub enum TaskEvent {
    Phase {
        task_id: TaskId,
        phase: TaskPhase,
    },
    Progress {
        task_id: TaskId,
        snapshot: ProgressSnapshot,
    },
    Completed {
        task_id: TaskId,
        artifact: PathBuf,
    },
    Failed {
        task_id: TaskId,
        error: Error,
    },
    Cancelled {
        task_id: TaskId,
    },
}

#[derive(Serialize)]
struct EventRecord<'a> {
    task_id: &'a TaskId,
    event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    phase: Option<TaskPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    percent: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    artifact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl TaskEvent {
    fn from_outcome(task_id: TaskId, outcome: TaskOutcome) -> Self {
        match outcome {
            TaskOutcome::Completed(artifact) => TaskEvent::Completed { task_id, artifact },
            TaskOutcome::Failed(error) => TaskEvent::Failed { task_id, error },
            TaskOutcome::Cancelled => TaskEvent::Cancelled { task_id },
        }
    }

    pub fn task_id(&self) -> &TaskId {
        match self {
            TaskEvent::Phase { task_id, .. }
            | TaskEvent::Progress { task_id, .. }
            | TaskEvent::Completed { task_id, .. }
            | TaskEvent::Failed { task_id, .. }
            | TaskEvent::Cancelled { task_id } => task_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskEvent::Completed { .. } | TaskEvent::Failed { .. } | TaskEvent::Cancelled { .. }
        )
    }

    /// Render as a single JSON object (one line, no trailing newline).
    pub fn to_json_line(&self) -> Result<String> {
        let mut record = EventRecord {
            task_id: self.task_id(),
            event: "",
            phase: None,
            percent: None,
            label: None,
            artifact: None,
            error: None,
        };

        match self {
            TaskEvent::Phase { phase, .. } => {
                record.event = "phase";
                record.phase = Some(*phase);
            }
            TaskEvent::Progress { snapshot, .. } => {
                record.event = "progress";
                record.phase = Some(snapshot.phase);
                record.percent = snapshot.percent;
                record.label = Some(&snapshot.label);
            }
            TaskEvent::Completed { artifact, .. } => {
                record.event = "completed";
                record.artifact = Some(artifact.display().to_string());
            }
            TaskEvent::Failed { error, .. } => {
                record.event = "failed";
                record.error = Some(error.to_string());
            }
            TaskEvent::Cancelled { .. } => {
                record.event = "cancelled";
            }
        }

        Ok(serde_json::to_string(&record)?)
    }
}

/// Event stream of an admitted task.
///
/// Yields phase/progress events while the task runs, then exactly one
/// terminal event, then `None`. Progress events may have been dropped if
/// the stream was not read fast enough; phase and terminal events never are.
#[derive(Debug)]
pub struct TaskHandle {
    task_id: TaskId,
    events: mpsc::Receiver<TaskEvent>,
    outcome: Option<oneshot::Receiver<TaskOutcome>>,
}

impl TaskHandle {
    pub(crate) fn new(
        task_id: TaskId,
        events: mpsc::Receiver<TaskEvent>,
        outcome: oneshot::Receiver<TaskOutcome>,
    ) -> Self {
        Self {
            task_id,
            events,
            outcome: Some(outcome),
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Next event, or `None` after the terminal event was returned.
    pub async fn next(&mut self) -> Option<TaskEvent> {
        let outcome = self.outcome.as_mut()?;

        if let Some(event) = self.events.recv().await {
            return Some(event);
        }

        // All progress senders are gone: the run has finished.
        let outcome = outcome.await.unwrap_or_else(|_| {
            TaskOutcome::Failed(Error::Internal("task ended without an outcome".to_string()))
        });
        self.outcome = None;
        Some(TaskEvent::from_outcome(self.task_id.clone(), outcome))
    }

    /// Drain events and return the terminal outcome.
    pub async fn wait(mut self) -> TaskOutcome {
        while let Some(event) = self.next().await {
            match event {
                TaskEvent::Completed { artifact, .. } => return TaskOutcome::Completed(artifact),
                TaskEvent::Failed { error, .. } => return TaskOutcome::Failed(error),
                TaskEvent::Cancelled { .. } => return TaskOutcome::Cancelled,
                _ => {}
            }
        }
        TaskOutcome::Failed(Error::Internal("event stream ended early".to_string()))
    }

    /// Adapt into a `futures::Stream`.
    pub fn into_stream(self) -> impl Stream<Item = TaskEvent> {
        stream::unfold(self, |mut handle| async move {
            handle.next().await.map(|event| (event, handle))
        })
    }
}
