//! Batched segment downloads.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::HeaderMap;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::download::retry::{with_retry, RetryPolicy};
use crate::download::segment::Segment;
use crate::error::{Error, Result};
use crate::net::Transport;
use crate::resources::{ResourceSet, TaskAbortHandle};

/// Worker pool and retry settings for one fetch.
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    pub concurrency: usize,
    pub max_attempts: u32,
    pub timeout: Duration,
    pub backoff: Duration,
}

impl FetchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.download.concurrency,
            max_attempts: config.download.max_attempts,
            timeout: config.segment_timeout(),
            backoff: config.retry_backoff(),
        }
    }
}

/// Running totals passed to the completion callback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchTally {
    pub completed: usize,
    pub total: usize,
    pub bytes: u64,
}

struct Fetched {
    slot: usize,
    attempts: u32,
    bytes: u64,
}

struct Failed {
    slot: usize,
    attempts: u32,
    error: Error,
}

/// Downloads segments `concurrency` at a time.
pub struct SegmentFetcher {
    transport: Arc<dyn Transport>,
    headers: HeaderMap,
    options: FetchOptions,
}

impl SegmentFetcher {
    pub fn new(transport: Arc<dyn Transport>, headers: HeaderMap, options: FetchOptions) -> Self {
        Self {
            transport,
            headers,
            options,
        }
    }

    /// Fetch every segment to its local path.
    ///
    /// Batches start only while `cancel` is clear. Each request is
    /// registered in `resources` for as long as it runs. The first segment
    /// to exhaust its attempts aborts the rest of its batch and fails the
    /// fetch with [`Error::SegmentFetch`].
    pub async fn fetch<F>(
        &self,
        segments: &mut [Segment],
        cancel: &CancellationToken,
        resources: &ResourceSet,
        mut on_done: F,
    ) -> Result<FetchTally>
    where
        F: FnMut(&FetchTally),
    {
        let mut tally = FetchTally {
            total: segments.len(),
            ..FetchTally::default()
        };
        let policy = RetryPolicy::new(self.options.max_attempts, self.options.backoff);
        let width = self.options.concurrency.max(1);

        for (batch_no, batch) in segments.chunks_mut(width).enumerate() {
            if cancel.is_cancelled() {
                tracing::debug!("Cancelled before batch {}", batch_no);
                return Err(Error::Cancelled);
            }
            tracing::debug!("Starting batch {} ({} segments)", batch_no, batch.len());

            let mut jobs = JoinSet::new();
            let mut guards = Vec::with_capacity(batch.len());

            for (slot, segment) in batch.iter_mut().enumerate() {
                segment.mark_in_flight();
                let job = self.download_job(slot, segment, policy, cancel.clone());
                let handle = jobs.spawn(job);
                guards.push(resources.register(TaskAbortHandle(handle)));
            }

            loop {
                let joined = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        jobs.shutdown().await;
                        return Err(Error::Cancelled);
                    }
                    joined = jobs.join_next() => joined,
                };

                let result = match joined {
                    None => break,
                    Some(Ok(result)) => result,
                    Some(Err(e)) if e.is_cancelled() => {
                        jobs.shutdown().await;
                        return Err(Error::Cancelled);
                    }
                    Some(Err(e)) => {
                        jobs.shutdown().await;
                        return Err(Error::Internal(format!("Segment worker panicked: {}", e)));
                    }
                };

                match result {
                    Ok(done) => {
                        batch[done.slot].mark_done(done.attempts, done.bytes);
                        tally.completed += 1;
                        tally.bytes += done.bytes;
                        on_done(&tally);
                    }
                    Err(failed) => {
                        jobs.shutdown().await;
                        let segment = &mut batch[failed.slot];
                        segment.mark_failed(failed.attempts);

                        if failed.error.is_cancelled() {
                            return Err(Error::Cancelled);
                        }

                        tracing::error!(
                            "Segment {} failed after {} attempt(s): {}",
                            segment.index(),
                            failed.attempts,
                            failed.error
                        );
                        return Err(Error::SegmentFetch {
                            index: segment.index(),
                            url: segment.url().to_string(),
                            attempts: failed.attempts,
                            message: failed.error.to_string(),
                        });
                    }
                }
            }

            drop(guards);
        }

        Ok(tally)
    }

    fn download_job(
        &self,
        slot: usize,
        segment: &Segment,
        policy: RetryPolicy,
        cancel: CancellationToken,
    ) -> impl std::future::Future<Output = std::result::Result<Fetched, Failed>> + Send + 'static {
        let transport = Arc::clone(&self.transport);
        let headers = self.headers.clone();
        let timeout = self.options.timeout;
        let url = segment.url().to_string();
        let path = segment.path().to_path_buf();

        async move {
            let transport = &transport;
            let headers = &headers;
            let url = url.as_str();

            let outcome = with_retry(&policy, &cancel, move |_| async move {
                transport.get_bytes(url, headers, timeout).await
            })
            .await;

            match outcome {
                Ok((body, attempts)) => match write_segment(&path, &body).await {
                    Ok(()) => Ok(Fetched {
                        slot,
                        attempts,
                        bytes: body.len() as u64,
                    }),
                    Err(e) => Err(Failed {
                        slot,
                        attempts,
                        error: e.into(),
                    }),
                },
                Err((error, attempts)) => Err(Failed {
                    slot,
                    attempts,
                    error,
                }),
            }
        }
    }
}

/// Write a segment body. Aborting the job stops it at the next write.
async fn write_segment(path: &std::path::Path, body: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path).await?;
    file.write_all(body).await?;
    file.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::segment::SegmentStatus;
    use crate::net::testing::{FakeTransport, Reply};
    use std::path::Path;

    fn options(concurrency: usize) -> FetchOptions {
        FetchOptions {
            concurrency,
            max_attempts: 3,
            timeout: Duration::from_secs(5),
            backoff: Duration::ZERO,
        }
    }

    fn segments(dir: &Path, count: usize) -> Vec<Segment> {
        (0..count)
            .map(|i| {
                Segment::new(
                    i,
                    format!("https://cdn.example/{}.ts", i),
                    dir.join(format!("segment_{:05}.ts", i)),
                )
            })
            .collect()
    }

    fn fetcher(transport: &FakeTransport, concurrency: usize) -> SegmentFetcher {
        SegmentFetcher::new(Arc::new(transport.clone()), HeaderMap::new(), options(concurrency))
    }

    #[tokio::test]
    async fn test_write_segment_truncates_leftover_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("segment_00000.ts");
        std::fs::write(&path, b"leftover from an aborted run").unwrap();

        write_segment(&path, b"fresh").await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"fresh");
    }

    #[tokio::test]
    async fn test_files_follow_manifest_order_not_completion_order() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FakeTransport::new();
        // Later segments finish first
        for i in 0..4u64 {
            transport.route(
                &format!("https://cdn.example/{}.ts", i),
                vec![Reply::Delayed(
                    format!("seg{}", i).into_bytes(),
                    Duration::from_millis(40 - i * 10),
                )],
            );
        }

        let mut segs = segments(dir.path(), 4);
        let mut seen = Vec::new();
        let tally = fetcher(&transport, 4)
            .fetch(&mut segs, &CancellationToken::new(), &ResourceSet::new(), |t| {
                seen.push(t.completed)
            })
            .await
            .unwrap();

        assert_eq!(tally.completed, 4);
        assert_eq!(tally.bytes, 16);
        assert_eq!(seen, vec![1, 2, 3, 4]);
        for (i, seg) in segs.iter().enumerate() {
            assert_eq!(seg.status(), SegmentStatus::Done);
            assert_eq!(std::fs::read(seg.path()).unwrap(), format!("seg{}", i).into_bytes());
        }
    }

    #[tokio::test]
    async fn test_batch_width_bounds_parallel_requests() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FakeTransport::new();
        for i in 0..7 {
            transport.route(
                &format!("https://cdn.example/{}.ts", i),
                vec![Reply::Delayed(b"x".to_vec(), Duration::from_millis(10))],
            );
        }

        let mut segs = segments(dir.path(), 7);
        fetcher(&transport, 3)
            .fetch(&mut segs, &CancellationToken::new(), &ResourceSet::new(), |_| {})
            .await
            .unwrap();

        assert!(transport.peak_in_flight() <= 3);
        assert!(transport.peak_in_flight() >= 2);
    }

    #[tokio::test]
    async fn test_two_transient_failures_are_absorbed() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FakeTransport::new();
        transport.bytes("https://cdn.example/0.ts", b"a");
        transport.route(
            "https://cdn.example/1.ts",
            vec![Reply::Timeout, Reply::Status(503), Reply::Body(b"b".to_vec())],
        );

        let mut segs = segments(dir.path(), 2);
        let tally = fetcher(&transport, 2)
            .fetch(&mut segs, &CancellationToken::new(), &ResourceSet::new(), |_| {})
            .await
            .unwrap();

        assert_eq!(tally.completed, 2);
        assert_eq!(transport.calls("https://cdn.example/1.ts"), 3);
        assert_eq!(segs[1].attempts(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_segment_fails_fetch_with_index() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FakeTransport::new();
        transport.bytes("https://cdn.example/0.ts", b"a");
        transport.route("https://cdn.example/1.ts", vec![Reply::Status(500)]);
        transport.bytes("https://cdn.example/2.ts", b"c");

        let mut segs = segments(dir.path(), 3);
        let err = fetcher(&transport, 1)
            .fetch(&mut segs, &CancellationToken::new(), &ResourceSet::new(), |_| {})
            .await
            .unwrap_err();

        match err {
            Error::SegmentFetch {
                index, attempts, url, ..
            } => {
                assert_eq!(index, 1);
                assert_eq!(attempts, 3);
                assert_eq!(url, "https://cdn.example/1.ts");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(segs[1].status(), SegmentStatus::Failed);
        // Later batches never start
        assert_eq!(transport.calls("https://cdn.example/2.ts"), 0);
    }

    #[tokio::test]
    async fn test_cancel_aborts_in_flight_requests() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FakeTransport::new();
        for i in 0..4 {
            transport.route(&format!("https://cdn.example/{}.ts", i), vec![Reply::Hang]);
        }

        let cancel = CancellationToken::new();
        let resources = ResourceSet::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });

        let mut segs = segments(dir.path(), 4);
        let err = fetcher(&transport, 2)
            .fetch(&mut segs, &cancel, &resources, |_| {})
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(resources.is_empty());
        for _ in 0..50 {
            if transport.in_flight() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(transport.in_flight(), 0);
        assert_eq!(transport.abandoned(), 2);
        assert_eq!(transport.calls("https://cdn.example/2.ts"), 0);
    }

    #[tokio::test]
    async fn test_cancelled_token_starts_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FakeTransport::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut segs = segments(dir.path(), 2);
        let err = fetcher(&transport, 2)
            .fetch(&mut segs, &cancel, &ResourceSet::new(), |_| {})
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(transport.calls("https://cdn.example/0.ts"), 0);
    }
}
