//! Throttled, non-blocking progress emission.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::task::events::TaskEvent;
use crate::task::log::LogBuffer;
use crate::task::state::{ProgressCell, ProgressSnapshot, TaskId, TaskPhase};

struct Emitted {
    phase: TaskPhase,
    percent: Option<u8>,
    label: String,
    at: Instant,
}

/// Converts internal progress updates into a bounded event stream.
///
/// Within a phase the emitted percent never decreases and never repeats
/// twice in a row, and two emissions are at least `min_interval` apart
/// (the first report of a phase and 100% are exempt from the interval).
/// A full or closed channel drops a progress update instead of waiting.
/// Phase events are never dropped: they wait in a backlog that is flushed
/// ahead of later updates and finally by [`ProgressReporter::close`].
pub struct ProgressReporter {
    task_id: TaskId,
    events: mpsc::Sender<TaskEvent>,
    cell: ProgressCell,
    log: LogBuffer,
    min_interval: Duration,
    last: Option<Emitted>,
    backlog: VecDeque<TaskEvent>,
    dropped: u64,
}

impl ProgressReporter {
    pub fn new(
        task_id: TaskId,
        events: mpsc::Sender<TaskEvent>,
        cell: ProgressCell,
        log: LogBuffer,
        min_interval: Duration,
    ) -> Self {
        Self {
            task_id,
            events,
            cell,
            log,
            min_interval,
            last: None,
            backlog: VecDeque::new(),
            dropped: 0,
        }
    }

    /// Announce a phase change. Resets the percent throttle.
    pub fn phase(&mut self, phase: TaskPhase) {
        self.last = None;
        self.backlog.push_back(TaskEvent::Phase {
            task_id: self.task_id.clone(),
            phase,
        });
        self.flush_backlog();
    }

    /// Offer an update; returns whether it was emitted.
    pub fn report(&mut self, phase: TaskPhase, percent: Option<u8>, label: impl Into<String>) -> bool {
        let percent = percent.map(|p| p.min(100));
        let label = label.into();
        let now = Instant::now();

        if let Some(last) = self.last.as_ref().filter(|last| last.phase == phase) {
            let too_soon = now.duration_since(last.at) < self.min_interval;
            match (percent, last.percent) {
                (Some(p), Some(previous)) if p <= previous => return false,
                (Some(p), _) if p < 100 && too_soon => return false,
                (None, _) if label == last.label || too_soon => return false,
                _ => {}
            }
        }

        let snapshot = ProgressSnapshot {
            phase,
            percent,
            label: label.clone(),
        };
        *self.cell.lock() = Some(snapshot.clone());
        self.log.progress(&label);
        self.last = Some(Emitted {
            phase,
            percent,
            label,
            at: now,
        });

        self.send(TaskEvent::Progress {
            task_id: self.task_id.clone(),
            snapshot,
        });
        true
    }

    /// Updates lost to a full channel.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Deliver the phase events still waiting, then close the stream.
    ///
    /// Waits for the consumer only if the channel is full.
    pub async fn close(mut self) {
        while let Some(event) = self.backlog.pop_front() {
            if self.events.send(event).await.is_err() {
                break;
            }
        }
    }

    fn flush_backlog(&mut self) {
        while let Some(event) = self.backlog.pop_front() {
            match self.events.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(event)) => {
                    self.backlog.push_front(event);
                    return;
                }
                Err(TrySendError::Closed(_)) => {
                    self.backlog.clear();
                    return;
                }
            }
        }
    }

    fn send(&mut self, event: TaskEvent) {
        self.flush_backlog();
        if !self.backlog.is_empty() {
            self.dropped += 1;
            return;
        }
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                tracing::debug!("Event channel full, dropping update for task {}", self.task_id);
            }
            // Nobody is listening.
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;

    fn reporter(interval: Duration, capacity: usize) -> (ProgressReporter, mpsc::Receiver<TaskEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        let reporter = ProgressReporter::new(
            TaskId::from("1"),
            tx,
            Arc::new(Mutex::new(None)),
            LogBuffer::new(10),
            interval,
        );
        (reporter, rx)
    }

    fn drain_percents(rx: &mut mpsc::Receiver<TaskEvent>) -> Vec<Option<u8>> {
        let mut percents = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let TaskEvent::Progress { snapshot, .. } = event {
                percents.push(snapshot.percent);
            }
        }
        percents
    }

    #[test]
    fn test_dedups_and_stays_monotonic() {
        let (mut reporter, mut rx) = reporter(Duration::ZERO, 64);

        for p in [0, 1, 1, 3, 2, 3, 7, 100, 100] {
            reporter.report(TaskPhase::Fetching, Some(p), format!("{}%", p));
        }

        assert_eq!(
            drain_percents(&mut rx),
            vec![Some(0), Some(1), Some(3), Some(7), Some(100)]
        );
    }

    #[test]
    fn test_time_throttle_keeps_final_update() {
        let (mut reporter, mut rx) = reporter(Duration::from_secs(60), 64);

        for p in 0..=100u8 {
            reporter.report(TaskPhase::Fetching, Some(p), format!("{}%", p));
        }

        assert_eq!(drain_percents(&mut rx), vec![Some(0), Some(100)]);
    }

    #[test]
    fn test_new_phase_resets_throttle() {
        let (mut reporter, mut rx) = reporter(Duration::from_secs(60), 64);

        assert!(reporter.report(TaskPhase::Fetching, Some(100), "done"));
        reporter.phase(TaskPhase::Assembling);
        assert!(reporter.report(TaskPhase::Assembling, Some(0), "remuxing"));
        assert!(!reporter.report(TaskPhase::Assembling, Some(0), "remuxing"));

        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(events.len(), 3);
        assert!(matches!(
            events[1],
            TaskEvent::Phase {
                phase: TaskPhase::Assembling,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_total_dedups_by_label() {
        let (mut reporter, mut rx) = reporter(Duration::ZERO, 64);

        assert!(reporter.report(TaskPhase::Fetching, None, "5.00MB (total unknown)"));
        assert!(!reporter.report(TaskPhase::Fetching, None, "5.00MB (total unknown)"));
        assert!(reporter.report(TaskPhase::Fetching, None, "10.00MB (total unknown)"));
        assert_eq!(drain_percents(&mut rx), vec![None, None]);
    }

    #[test]
    fn test_full_channel_drops_instead_of_blocking() {
        let (mut reporter, mut rx) = reporter(Duration::ZERO, 2);

        for p in 0..10u8 {
            reporter.report(TaskPhase::Fetching, Some(p * 10), "x");
        }

        assert_eq!(drain_percents(&mut rx).len(), 2);
        assert_eq!(reporter.dropped(), 8);
        assert_eq!(reporter.cell.lock().as_ref().unwrap().percent, Some(90));
    }

    #[tokio::test]
    async fn test_phase_events_survive_a_full_channel() {
        let (mut reporter, mut rx) = reporter(Duration::ZERO, 1);

        reporter.report(TaskPhase::Fetching, Some(100), "done");
        reporter.phase(TaskPhase::Assembling);
        // Queued behind the phase change, so it is dropped
        reporter.report(TaskPhase::Assembling, Some(10), "remuxing");
        assert_eq!(reporter.dropped(), 1);

        assert!(matches!(rx.recv().await, Some(TaskEvent::Progress { .. })));
        reporter.close().await;
        assert!(matches!(
            rx.recv().await,
            Some(TaskEvent::Phase {
                phase: TaskPhase::Assembling,
                ..
            })
        ));
        assert!(rx.recv().await.is_none());
    }
}
