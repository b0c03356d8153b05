//! Manifest resolution: variant playlists down to one ordered segment list.

use std::collections::HashSet;
use std::time::Duration;

use reqwest::header::HeaderMap;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{Error, Result};
use crate::manifest::parser::{parse_playlist, PlaylistDoc, Variant};
use crate::net::Transport;

/// A resolved leaf manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// The URL the task was submitted with.
    pub url: String,
    /// The media playlist the segments came from.
    pub leaf_url: String,
    /// Absolute segment addresses in playback order.
    pub segment_urls: Vec<String>,
    /// Total media duration, when every segment declares one.
    pub duration: Option<Duration>,
}

impl Manifest {
    pub fn len(&self) -> usize {
        self.segment_urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segment_urls.is_empty()
    }
}

/// Fetches a manifest and follows variant playlists to a segment list.
pub struct ManifestResolver<'a> {
    transport: &'a dyn Transport,
    headers: &'a HeaderMap,
    timeout: Duration,
    max_depth: usize,
}

impl<'a> ManifestResolver<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        headers: &'a HeaderMap,
        timeout: Duration,
        max_depth: usize,
    ) -> Self {
        Self {
            transport,
            headers,
            timeout,
            max_depth,
        }
    }

    /// Resolve `url` to its leaf segment list.
    ///
    /// Always picks the highest-bandwidth variant. Fails with
    /// `ManifestParse` when the leaf lists no segments, when a variant
    /// playlist has no usable child, or when nesting is deeper than
    /// `max_depth` or loops back on itself.
    pub async fn resolve(&self, url: &str, cancel: &CancellationToken) -> Result<Manifest> {
        let mut current = Url::parse(url)
            .map_err(|e| Error::ManifestParse(format!("Invalid manifest URL '{}': {}", url, e)))?;
        let mut visited = HashSet::new();

        for depth in 0..=self.max_depth {
            if !visited.insert(current.to_string()) {
                return Err(Error::ManifestParse(format!(
                    "Manifest {} references itself",
                    current
                )));
            }

            let content = self.fetch(current.as_str(), cancel).await?;

            match parse_playlist(&content)? {
                PlaylistDoc::Variants(variants) => {
                    let variant = select_variant(&variants).ok_or_else(|| {
                        Error::ManifestParse(format!(
                            "Variant playlist {} has no playable stream",
                            current
                        ))
                    })?;
                    tracing::debug!(
                        "Depth {}: selected variant {} ({} bps) of {}",
                        depth,
                        variant.uri,
                        variant.bandwidth,
                        variants.len()
                    );
                    current = resolve_reference(&current, &variant.uri)?;
                }
                PlaylistDoc::Segments(list) => {
                    let references = list.uris;
                    if references.is_empty() {
                        return Err(Error::ManifestParse("no segments found".to_string()));
                    }

                    let segment_urls = references
                        .iter()
                        .map(|r| resolve_reference(&current, r).map(String::from))
                        .collect::<Result<Vec<_>>>()?;

                    tracing::debug!(
                        "Resolved {} segments from {}",
                        segment_urls.len(),
                        current
                    );

                    return Ok(Manifest {
                        url: url.to_string(),
                        leaf_url: current.to_string(),
                        segment_urls,
                        duration: list.duration,
                    });
                }
            }
        }

        Err(Error::ManifestParse(format!(
            "Variant playlists nested deeper than {} levels",
            self.max_depth
        )))
    }

    async fn fetch(&self, url: &str, cancel: &CancellationToken) -> Result<String> {
        let request = self.transport.get_text(url, self.headers, self.timeout);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = request => result,
        };

        result.map_err(|e| match e {
            Error::Cancelled => Error::Cancelled,
            other => Error::ManifestFetch {
                url: url.to_string(),
                message: other.to_string(),
            },
        })
    }
}

/// Highest declared bandwidth; the earliest entry wins a tie.
pub fn select_variant(variants: &[Variant]) -> Option<&Variant> {
    variants
        .iter()
        .reduce(|best, v| if v.bandwidth > best.bandwidth { v } else { best })
}

/// Resolve a manifest reference against the manifest's own address.
///
/// Absolute URLs pass through, `/path` resolves against the origin and
/// anything else against the manifest's directory.
pub fn resolve_reference(base: &Url, reference: &str) -> Result<Url> {
    base.join(reference).map_err(|e| {
        Error::ManifestParse(format!("Invalid reference '{}' in {}: {}", reference, base, e))
    })
}
