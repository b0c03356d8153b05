//! Single-slot task supervisor.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::assemble::Assembler;
use crate::config::{validate_config, Config};
use crate::error::{Error, Result};
use crate::net::{HttpTransport, RequestHeaders, Transport};
use crate::resources::ResourceSet;
use crate::task::events::TaskHandle;
use crate::task::log::LogBuffer;
use crate::task::runner::{self, RunContext};
use crate::task::state::{ProgressSnapshot, Task, TaskId, TaskPhase};

/// How the submitted URL is acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceKind {
    /// Playlist when the URL path ends in `.m3u8`, otherwise direct.
    #[default]
    Auto,
    Hls,
    Direct,
}

impl SourceKind {
    /// Settle `Auto` for a concrete URL.
    pub fn resolve(self, url: &str) -> SourceKind {
        match self {
            SourceKind::Auto => {
                let is_playlist = url::Url::parse(url)
                    .map(|u| u.path().to_ascii_lowercase().ends_with(".m3u8"))
                    .unwrap_or(true);
                if is_playlist {
                    SourceKind::Hls
                } else {
                    SourceKind::Direct
                }
            }
            kind => kind,
        }
    }
}

/// One acquisition job.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub task_id: TaskId,
    pub url: String,
    pub headers: RequestHeaders,
    pub output: PathBuf,
    pub kind: SourceKind,
}

impl TaskRequest {
    pub fn new(task_id: impl Into<TaskId>, url: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            task_id: task_id.into(),
            url: url.into(),
            headers: RequestHeaders::default(),
            output: output.into(),
            kind: SourceKind::Auto,
        }
    }

    pub fn with_headers(mut self, headers: RequestHeaders) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_kind(mut self, kind: SourceKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Immediate refusal of a submission while another task holds the slot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "busy: task {active_id} is {phase}{}",
    .progress.as_ref().map(|p| format!(" ({})", p)).unwrap_or_default()
)]
pub struct Rejection {
    pub active_id: TaskId,
    pub phase: TaskPhase,
    pub progress: Option<String>,
}

/// Answer to a cancel request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelAck {
    /// The task was running and has been torn down.
    Acknowledged { task_id: TaskId, phase: TaskPhase },
    /// Nothing matching was running; carries the active task, if any.
    NotRunning { active: Option<(TaskId, TaskPhase)> },
}

impl fmt::Display for CancelAck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelAck::Acknowledged { task_id, phase } => {
                write!(f, "cancelled task {} during {}", task_id, phase)
            }
            CancelAck::NotRunning { active: None } => write!(f, "not running"),
            CancelAck::NotRunning {
                active: Some((id, phase)),
            } => write!(f, "not running (active task is {} [{}])", id, phase),
        }
    }
}

/// Snapshot of the task holding the slot.
#[derive(Debug, Clone)]
pub struct ActiveTask {
    pub id: TaskId,
    pub url: String,
    pub phase: TaskPhase,
    pub progress: Option<ProgressSnapshot>,
    pub started_at: DateTime<Local>,
}

pub(crate) struct Inner {
    pub(crate) config: Config,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) assembler: Assembler,
    pub(crate) slot: Mutex<Option<Task>>,
    pub(crate) log: LogBuffer,
}

impl Inner {
    /// Advance the active task, unless it was cancelled meanwhile.
    pub(crate) fn advance(&self, id: &TaskId, next: TaskPhase) -> Result<()> {
        let mut slot = self.slot.lock();
        match slot.as_mut() {
            Some(task) if &task.id == id => {
                if task.cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                task.advance(next)?;
                self.log.info(format!("Task {} {}", id, next));
                Ok(())
            }
            _ => Err(Error::Internal(format!("Task {} no longer holds the slot", id))),
        }
    }
}

/// Runs at most one task at a time.
///
/// Cloning is cheap; all clones share the same slot.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    pub fn new(config: Config, transport: Arc<dyn Transport>) -> Self {
        let assembler = Assembler::from_config(&config.assembly);
        let log = LogBuffer::new(config.log.capacity);
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                assembler,
                slot: Mutex::new(None),
                log,
            }),
        }
    }

    /// Validate `config` and use the reqwest transport.
    pub fn with_http(config: Config) -> Result<Self> {
        validate_config(&config)?;
        let transport = HttpTransport::new(&config.network.user_agent)?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Admit `request` if the slot is free and start running it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, request: TaskRequest) -> std::result::Result<TaskHandle, Rejection> {
        let ctx = {
            let mut slot = self.inner.slot.lock();
            if let Some(active) = slot.as_ref() {
                let rejection = Rejection {
                    active_id: active.id.clone(),
                    phase: active.phase(),
                    progress: active.progress_label(),
                };
                drop(slot);
                self.inner
                    .log
                    .info(format!("Rejected task {}: {}", request.task_id, rejection));
                return Err(rejection);
            }

            let task = Task::admit(request.task_id.clone(), request.url.clone());
            let ctx = RunContext::for_task(&task);
            *slot = Some(task);
            ctx
        };

        self.inner
            .log
            .info(format!("Task {} admitted: {}", request.task_id, request.url));

        let (events_tx, events_rx) = mpsc::channel(self.inner.config.progress.channel_capacity.max(1));
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let handle = TaskHandle::new(request.task_id.clone(), events_rx, outcome_rx);

        tokio::spawn(runner::run(
            Arc::clone(&self.inner),
            ctx,
            request,
            events_tx,
            outcome_tx,
        ));

        Ok(handle)
    }

    /// Cancel the task with `id` and wait until its teardown is finished.
    ///
    /// Handles are terminated after the slot lock is released, so a
    /// registered callback may call back into the supervisor.
    pub async fn cancel(&self, id: &TaskId) -> CancelAck {
        let (phase, token, resources, finished) = {
            let slot = self.inner.slot.lock();
            match slot.as_ref() {
                Some(task) if &task.id == id => (
                    task.phase(),
                    task.cancel.clone(),
                    task.resources.clone(),
                    task.finished.clone(),
                ),
                other => {
                    return CancelAck::NotRunning {
                        active: other.map(|t| (t.id.clone(), t.phase())),
                    }
                }
            }
        };

        token.cancel();
        let terminated = resources.terminate_all();
        self.inner.log.info(format!(
            "Cancelling task {} during {} ({} open handle(s))",
            id, phase, terminated
        ));

        finished.cancelled().await;
        CancelAck::Acknowledged {
            task_id: id.clone(),
            phase,
        }
    }

    /// Cancel whatever task is running.
    pub async fn stop_active(&self) -> CancelAck {
        let active = self.inner.slot.lock().as_ref().map(|t| t.id.clone());
        match active {
            Some(id) => self.cancel(&id).await,
            None => CancelAck::NotRunning { active: None },
        }
    }

    pub fn active(&self) -> Option<ActiveTask> {
        self.inner.slot.lock().as_ref().map(|task| ActiveTask {
            id: task.id.clone(),
            url: task.url.clone(),
            phase: task.phase(),
            progress: task.progress.lock().clone(),
            started_at: task.started_at,
        })
    }

    pub fn is_idle(&self) -> bool {
        self.inner.slot.lock().is_none()
    }

    /// Resources of the active task.
    pub fn resources(&self) -> Option<ResourceSet> {
        self.inner.slot.lock().as_ref().map(|t| t.resources.clone())
    }

    pub fn log_lines(&self) -> Vec<String> {
        self.inner.log.lines()
    }

    /// "idle" or "busy (id [phase] (progress))", then the recent log.
    pub fn status_report(&self) -> String {
        let mut report = match self.active() {
            None => "idle".to_string(),
            Some(active) => match active.progress {
                Some(progress) => format!(
                    "busy ({} [{}] ({}))",
                    active.id, active.phase, progress.label
                ),
                None => format!("busy ({} [{}])", active.id, active.phase),
            },
        };

        for line in self.inner.log.lines() {
            report.push('\n');
            report.push_str(&line);
        }
        report
    }
}
