//! Progressive (single file) downloads.

use std::path::Path;

use futures::StreamExt;
use reqwest::header::HeaderMap;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::net::{ByteStream, Transport};
use crate::resources::{ResourceKind, ResourceSet, TokenHandle};

/// Progress granularity when the server does not send a length.
pub const UNKNOWN_TOTAL_STEP: u64 = 5 * 1024 * 1024;

/// Stream `url` into `dest`, reporting `(bytes_done, total)` as it goes.
///
/// With a known total every chunk is reported; without one only each
/// [`UNKNOWN_TOTAL_STEP`] crossed and the final count are. The request is
/// registered in `resources` until the body is fully written.
pub async fn download_direct<F>(
    transport: &dyn Transport,
    url: &str,
    headers: &HeaderMap,
    dest: &Path,
    cancel: &CancellationToken,
    resources: &ResourceSet,
    mut on_progress: F,
) -> Result<u64>
where
    F: FnMut(u64, Option<u64>),
{
    let request = cancel.child_token();
    let _guard = resources.register(TokenHandle::new(ResourceKind::Request, request.clone()));

    let ByteStream {
        content_length,
        mut chunks,
    } = tokio::select! {
        biased;
        _ = request.cancelled() => return Err(Error::Cancelled),
        opened = transport.open_stream(url, headers) => opened?,
    };

    match content_length {
        Some(total) => tracing::debug!("Streaming {} ({} bytes)", url, total),
        None => tracing::debug!("Streaming {} (length unknown)", url),
    }

    let mut file = File::create(dest).await?;
    let mut done: u64 = 0;

    loop {
        let next = tokio::select! {
            biased;
            _ = request.cancelled() => return Err(Error::Cancelled),
            next = chunks.next() => next,
        };
        let Some(chunk) = next else { break };
        let chunk = chunk?;

        file.write_all(&chunk).await?;
        let before = done;
        done += chunk.len() as u64;

        if content_length.is_some() || crossed_step(before, done) {
            on_progress(done, content_length);
        }
    }

    file.flush().await?;

    if content_length.is_none() {
        on_progress(done, None);
    }

    Ok(done)
}

fn crossed_step(before: u64, after: u64) -> bool {
    before / UNKNOWN_TOTAL_STEP != after / UNKNOWN_TOTAL_STEP
}
