//! The run of one admitted task, from resolution to teardown.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::HeaderMap;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::download::{download_direct, ordered_paths, plan_segments, FetchOptions, SegmentFetcher};
use crate::error::{Error, Result};
use crate::fs::{publish_artifact, remove_work_dir, staged_file_name, task_work_dir};
use crate::manifest::ManifestResolver;
use crate::progress::{
    duration_percent, percent_of, remux_label, segments_label, transfer_label, ProgressReporter,
};
use crate::resources::ResourceSet;
use crate::task::events::{TaskEvent, TaskOutcome};
use crate::task::state::{ProgressCell, Task, TaskId, TaskPhase};
use crate::task::supervisor::{Inner, SourceKind, TaskRequest};

/// Handles a run shares with the task in the slot.
pub(crate) struct RunContext {
    id: TaskId,
    cancel: CancellationToken,
    resources: ResourceSet,
    progress: ProgressCell,
    finished: CancellationToken,
}

impl RunContext {
    pub(crate) fn for_task(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            cancel: task.cancel.clone(),
            resources: task.resources.clone(),
            progress: Arc::clone(&task.progress),
            finished: task.finished.clone(),
        }
    }
}

pub(crate) async fn run(
    inner: Arc<Inner>,
    ctx: RunContext,
    request: TaskRequest,
    events: mpsc::Sender<TaskEvent>,
    outcome_tx: oneshot::Sender<TaskOutcome>,
) {
    let mut reporter = ProgressReporter::new(
        ctx.id.clone(),
        events,
        Arc::clone(&ctx.progress),
        inner.log.clone(),
        inner.config.progress_interval(),
    );
    reporter.phase(TaskPhase::Resolving);

    let work_root = inner.config.work_root(&request.output);
    let (work_dir, result) = match task_work_dir(&work_root, ctx.id.as_str()) {
        Ok(work_dir) => {
            let result = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => Err(Error::Cancelled),
                result = pipeline(&inner, &ctx, &request, &work_dir, &mut reporter) => result,
            };
            (Some(work_dir), result)
        }
        Err(e) => (None, Err(e)),
    };

    let outcome = teardown(&inner, &ctx, work_dir.as_deref(), result).await;

    // Close the event stream before delivering the terminal outcome
    reporter.close().await;
    if outcome_tx.send(outcome).is_err() {
        tracing::debug!("Task {} outcome had no receiver", ctx.id);
    }
}

async fn pipeline(
    inner: &Inner,
    ctx: &RunContext,
    request: &TaskRequest,
    work_dir: &Path,
    reporter: &mut ProgressReporter,
) -> Result<PathBuf> {
    let headers = request.headers.to_header_map()?;

    match request.kind.resolve(&request.url) {
        SourceKind::Direct => run_direct(inner, ctx, request, &headers, work_dir, reporter).await,
        _ => run_playlist(inner, ctx, request, headers, work_dir, reporter).await,
    }
}

async fn run_playlist(
    inner: &Inner,
    ctx: &RunContext,
    request: &TaskRequest,
    headers: HeaderMap,
    work_dir: &Path,
    reporter: &mut ProgressReporter,
) -> Result<PathBuf> {
    let manifest = ManifestResolver::new(
        inner.transport.as_ref(),
        &headers,
        inner.config.manifest_timeout(),
        inner.config.download.max_manifest_depth,
    )
    .resolve(&request.url, &ctx.cancel)
    .await?;
    inner.log.info(format!(
        "Resolved {} segment(s) from {}",
        manifest.len(),
        manifest.leaf_url
    ));

    inner.advance(&ctx.id, TaskPhase::Fetching)?;
    reporter.phase(TaskPhase::Fetching);

    tokio::fs::create_dir_all(work_dir).await?;
    let mut segments = plan_segments(&manifest, work_dir);

    let fetcher = SegmentFetcher::new(
        Arc::clone(&inner.transport),
        headers,
        FetchOptions::from_config(&inner.config),
    );
    let started = Instant::now();
    fetcher
        .fetch(&mut segments, &ctx.cancel, &ctx.resources, |tally| {
            let percent = percent_of(tally.completed as u64, tally.total as u64);
            let label = segments_label(tally.completed, tally.total, tally.bytes, started.elapsed());
            reporter.report(TaskPhase::Fetching, Some(percent), label);
        })
        .await?;

    let paths = ordered_paths(&segments)?;

    inner.advance(&ctx.id, TaskPhase::Assembling)?;
    reporter.phase(TaskPhase::Assembling);
    // Without declared durations only the written time is shown
    let total = manifest.duration.filter(|d| !d.is_zero());
    let count = paths.len();
    reporter.report(
        TaskPhase::Assembling,
        total.map(|_| 0),
        remux_label(count, Duration::ZERO, total),
    );

    inner
        .assembler
        .assemble(
            &paths,
            work_dir,
            &request.output,
            &ctx.cancel,
            &ctx.resources,
            |out_time| {
                let percent = total.map(|total| duration_percent(out_time, total));
                reporter.report(
                    TaskPhase::Assembling,
                    percent,
                    remux_label(count, out_time, total),
                );
            },
        )
        .await
}

async fn run_direct(
    inner: &Inner,
    ctx: &RunContext,
    request: &TaskRequest,
    headers: &HeaderMap,
    work_dir: &Path,
    reporter: &mut ProgressReporter,
) -> Result<PathBuf> {
    inner.advance(&ctx.id, TaskPhase::Fetching)?;
    reporter.phase(TaskPhase::Fetching);

    tokio::fs::create_dir_all(work_dir).await?;
    let staged = work_dir.join(staged_file_name(&request.output));

    let bytes = download_direct(
        inner.transport.as_ref(),
        &request.url,
        headers,
        &staged,
        &ctx.cancel,
        &ctx.resources,
        |done, total| {
            let percent = total.map(|total| percent_of(done, total));
            reporter.report(TaskPhase::Fetching, percent, transfer_label(done, total));
        },
    )
    .await?;
    inner.log.info(format!("Downloaded {} bytes from {}", bytes, request.url));

    inner.advance(&ctx.id, TaskPhase::Assembling)?;
    reporter.phase(TaskPhase::Assembling);

    publish_artifact(&staged, &request.output).await?;
    Ok(request.output.clone())
}

/// Release everything the run holds and settle its single outcome.
///
/// A cancelled token always wins over whatever the pipeline returned.
async fn teardown(
    inner: &Inner,
    ctx: &RunContext,
    work_dir: Option<&Path>,
    result: Result<PathBuf>,
) -> TaskOutcome {
    let terminated = ctx.resources.terminate_all();
    if terminated > 0 {
        tracing::debug!("Task {}: terminated {} open handle(s)", ctx.id, terminated);
    }

    if let Some(dir) = work_dir {
        remove_work_dir(dir).await;
    }

    let (outcome, discard) = {
        let mut slot = inner.slot.lock();
        let cancelled = ctx.cancel.is_cancelled();

        let (outcome, discard) = match result {
            Ok(artifact) if cancelled => (TaskOutcome::Cancelled, Some(artifact)),
            Ok(artifact) => (TaskOutcome::Completed(artifact), None),
            Err(e) if cancelled || e.is_cancelled() => (TaskOutcome::Cancelled, None),
            Err(e) => (TaskOutcome::Failed(e), None),
        };

        if let Some(task) = slot.as_mut().filter(|task| task.id == ctx.id) {
            if let Err(e) = task.advance(outcome.phase()) {
                tracing::debug!("{}", e);
            }
        }
        *ctx.progress.lock() = None;

        inner.log.clear_progress();
        match &outcome {
            TaskOutcome::Completed(artifact) => inner.log.info(format!(
                "Task {} completed: {}",
                ctx.id,
                artifact.display()
            )),
            TaskOutcome::Failed(e) => inner.log.error(format!("Task {} failed: {}", ctx.id, e)),
            TaskOutcome::Cancelled => inner.log.info(format!("Task {} cancelled", ctx.id)),
        }

        if matches!(slot.as_ref(), Some(task) if task.id == ctx.id) {
            *slot = None;
        }
        (outcome, discard)
    };

    if let Some(artifact) = discard {
        match tokio::fs::remove_file(&artifact).await {
            Ok(()) => tracing::debug!("Removed {} published after cancellation", artifact.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove {}: {}", artifact.display(), e),
        }
    }

    ctx.finished.cancel();
    outcome
}
