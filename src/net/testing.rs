//! Scripted in-memory transport for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use reqwest::header::HeaderMap;

use crate::error::{Error, Result};
use crate::net::client::{ByteStream, Transport};

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum Reply {
    Body(Vec<u8>),
    /// Body delivered after a delay.
    Delayed(Vec<u8>, Duration),
    Status(u16),
    Timeout,
    /// Never completes.
    Hang,
    /// Streaming body with an optional advertised length.
    Chunks(Vec<Vec<u8>>, Option<u64>),
}

#[derive(Default)]
struct Counters {
    active: AtomicUsize,
    peak: AtomicUsize,
    abandoned: AtomicUsize,
}

/// Replies are consumed in order per URL; the last one repeats.
#[derive(Clone, Default)]
pub struct FakeTransport {
    routes: Arc<Mutex<HashMap<String, VecDeque<Reply>>>>,
    calls: Arc<Mutex<HashMap<String, usize>>>,
    headers_seen: Arc<Mutex<Vec<(String, HeaderMap)>>>,
    counters: Arc<Counters>,
}

/// Tracks a request for the peak/abandoned counters.
struct InFlight {
    counters: Arc<Counters>,
    finished: bool,
}

impl InFlight {
    fn start(counters: &Arc<Counters>) -> Self {
        let now = counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak.fetch_max(now, Ordering::SeqCst);
        Self {
            counters: Arc::clone(counters),
            finished: false,
        }
    }

    fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.counters.active.fetch_sub(1, Ordering::SeqCst);
        if !self.finished {
            self.counters.abandoned.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, url: &str, replies: Vec<Reply>) -> &Self {
        self.routes
            .lock()
            .insert(url.to_string(), replies.into_iter().collect());
        self
    }

    pub fn text(&self, url: &str, body: &str) -> &Self {
        self.route(url, vec![Reply::Body(body.as_bytes().to_vec())])
    }

    pub fn bytes(&self, url: &str, body: &[u8]) -> &Self {
        self.route(url, vec![Reply::Body(body.to_vec())])
    }

    /// Number of requests made to `url`.
    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().get(url).copied().unwrap_or(0)
    }

    /// Highest number of simultaneously open requests.
    pub fn peak_in_flight(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    /// Requests dropped before they produced a reply.
    pub fn abandoned(&self) -> usize {
        self.counters.abandoned.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }

    /// Headers of the most recent request to `url`.
    pub fn headers_for(&self, url: &str) -> Option<HeaderMap> {
        self.headers_seen
            .lock()
            .iter()
            .rev()
            .find(|(seen, _)| seen == url)
            .map(|(_, headers)| headers.clone())
    }

    fn next_reply(&self, url: &str, headers: &HeaderMap) -> Reply {
        *self.calls.lock().entry(url.to_string()).or_insert(0) += 1;
        self.headers_seen
            .lock()
            .push((url.to_string(), headers.clone()));

        let mut routes = self.routes.lock();
        match routes.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Reply::Status(404)),
            Some(queue) => queue.front().cloned().unwrap_or(Reply::Status(404)),
            None => Reply::Status(404),
        }
    }

    async fn body(&self, url: &str, headers: &HeaderMap) -> Result<Vec<u8>> {
        let reply = self.next_reply(url, headers);
        let guard = InFlight::start(&self.counters);

        let result = match reply {
            Reply::Body(body) => Ok(body),
            Reply::Delayed(body, delay) => {
                tokio::time::sleep(delay).await;
                Ok(body)
            }
            Reply::Status(status) => Err(Error::HttpStatus {
                status,
                url: url.to_string(),
            }),
            Reply::Timeout => Err(Error::Timeout {
                url: url.to_string(),
            }),
            Reply::Hang => futures::future::pending::<Result<Vec<u8>>>().await,
            Reply::Chunks(chunks, _) => Ok(chunks.concat()),
        };

        guard.finish();
        result
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn get_text(&self, url: &str, headers: &HeaderMap, _timeout: Duration) -> Result<String> {
        let body = self.body(url, headers).await?;
        // Decoded lossily, like `reqwest::Response::text`
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    async fn get_bytes(
        &self,
        url: &str,
        headers: &HeaderMap,
        _timeout: Duration,
    ) -> Result<Bytes> {
        self.body(url, headers).await.map(Bytes::from)
    }

    async fn open_stream(&self, url: &str, headers: &HeaderMap) -> Result<ByteStream> {
        match self.next_reply(url, headers) {
            Reply::Chunks(chunks, content_length) => Ok(ByteStream {
                content_length,
                chunks: stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from(c)))).boxed(),
            }),
            Reply::Body(body) => Ok(ByteStream {
                content_length: Some(body.len() as u64),
                chunks: stream::iter(vec![Ok(Bytes::from(body))]).boxed(),
            }),
            Reply::Status(status) => Err(Error::HttpStatus {
                status,
                url: url.to_string(),
            }),
            Reply::Hang => futures::future::pending::<Result<ByteStream>>().await,
            _ => Err(Error::Timeout {
                url: url.to_string(),
            }),
        }
    }
}
