//! HTTP transport used for manifests and segments.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use reqwest::header::HeaderMap;
use reqwest::{Client, Response};

use crate::error::{Error, Result};

/// A response body delivered chunk by chunk.
pub struct ByteStream {
    pub content_length: Option<u64>,
    pub chunks: BoxStream<'static, Result<Bytes>>,
}

/// Network access used by the resolver and the fetchers.
///
/// Every call is a single attempt; retry policy lives with the caller.
/// Dropping the returned future aborts the request.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch a text document (manifest).
    async fn get_text(&self, url: &str, headers: &HeaderMap, timeout: Duration) -> Result<String>;

    /// Fetch a complete binary body (segment).
    async fn get_bytes(&self, url: &str, headers: &HeaderMap, timeout: Duration)
        -> Result<Bytes>;

    /// Open a streaming body (progressive download).
    async fn open_stream(&self, url: &str, headers: &HeaderMap) -> Result<ByteStream>;
}

/// reqwest-backed transport sharing one connection pool.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Build a transport with the given default user agent.
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    async fn get(&self, url: &str, headers: &HeaderMap, timeout: Option<Duration>) -> Result<Response> {
        tracing::debug!("GET {}", url);

        let mut request = self.client.get(url).headers(headers.clone());
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| map_reqwest(url, e))?;

        let status = response.status();
        tracing::debug!("Response status: {}", status);

        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_text(&self, url: &str, headers: &HeaderMap, timeout: Duration) -> Result<String> {
        let response = self.get(url, headers, Some(timeout)).await?;
        response.text().await.map_err(|e| map_reqwest(url, e))
    }

    async fn get_bytes(
        &self,
        url: &str,
        headers: &HeaderMap,
        timeout: Duration,
    ) -> Result<Bytes> {
        let response = self.get(url, headers, Some(timeout)).await?;
        response.bytes().await.map_err(|e| map_reqwest(url, e))
    }

    async fn open_stream(&self, url: &str, headers: &HeaderMap) -> Result<ByteStream> {
        let response = self.get(url, headers, None).await?;
        let content_length = response.content_length().filter(|len| *len > 0);
        let url = url.to_string();
        let chunks = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| map_reqwest(&url, e)))
            .boxed();

        Ok(ByteStream {
            content_length,
            chunks,
        })
    }
}

fn map_reqwest(url: &str, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout {
            url: url.to_string(),
        }
    } else {
        Error::Http(err)
    }
}
