//! Playlist document parsing.
//!
//! Well-formed HLS goes through `m3u8-rs`. Documents it rejects (missing
//! `#EXTM3U` header, stray whitespace, bare URI lists) fall back to a line
//! scanner: comment lines are skipped and every other non-empty line is a
//! reference.

use std::time::Duration;

use regex::Regex;

use crate::error::{Error, Result};

/// Tag that marks a variant (master) playlist entry.
const STREAM_INF_TAG: &str = "#EXT-X-STREAM-INF";

/// Tag carrying a segment's duration in seconds.
const EXTINF_TAG: &str = "#EXTINF:";

/// One alternative sub-manifest of a variant playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub bandwidth: u64,
    pub uri: String,
}

/// What a fetched playlist document contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaylistDoc {
    /// Variant streams, each a nested manifest.
    Variants(Vec<Variant>),
    /// Segment references of a media playlist.
    Segments(SegmentList),
}

/// Unresolved segment references in playback order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentList {
    pub uris: Vec<String>,
    /// Sum of the `#EXTINF` durations, known only when every segment has one.
    pub duration: Option<Duration>,
}

impl SegmentList {
    fn from_entries(entries: Vec<(String, Option<f64>)>) -> Self {
        let duration = total_duration(entries.iter().map(|(_, d)| *d));
        Self {
            uris: entries.into_iter().map(|(uri, _)| uri).collect(),
            duration,
        }
    }
}

/// Parse a playlist document.
pub fn parse_playlist(content: &str) -> Result<PlaylistDoc> {
    match m3u8_rs::parse_playlist_res(content.as_bytes()) {
        Ok(m3u8_rs::Playlist::MasterPlaylist(master)) => {
            let variants: Vec<Variant> = master
                .variants
                .into_iter()
                .filter(|v| !v.is_i_frame && !v.uri.trim().is_empty())
                .map(|v| Variant {
                    bandwidth: v.bandwidth,
                    uri: v.uri.trim().to_string(),
                })
                .collect();
            Ok(PlaylistDoc::Variants(variants))
        }
        Ok(m3u8_rs::Playlist::MediaPlaylist(media)) => {
            let entries = media
                .segments
                .into_iter()
                .map(|s| (s.uri.trim().to_string(), Some(f64::from(s.duration))))
                .filter(|(uri, _)| !uri.is_empty())
                .collect();
            Ok(PlaylistDoc::Segments(SegmentList::from_entries(entries)))
        }
        Err(e) => {
            tracing::debug!("m3u8 parser rejected document, scanning lines: {:?}", e);
            scan_lines(content)
        }
    }
}

/// Line-oriented fallback parser.
fn scan_lines(content: &str) -> Result<PlaylistDoc> {
    let lines: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    if !lines.iter().any(|l| l.starts_with(STREAM_INF_TAG)) {
        let mut entries = Vec::new();
        let mut pending: Option<f64> = None;
        for line in lines {
            if let Some(info) = line.strip_prefix(EXTINF_TAG) {
                pending = info.split(',').next().and_then(|d| d.trim().parse().ok());
            } else if !line.starts_with('#') {
                entries.push((line.to_string(), pending.take()));
            }
        }
        return Ok(PlaylistDoc::Segments(SegmentList::from_entries(entries)));
    }

    let bandwidth_pattern = Regex::new(r"(?:^|[:,])BANDWIDTH=(\d+)")
        .map_err(|e| Error::ManifestParse(format!("Invalid bandwidth pattern: {}", e)))?;

    let mut variants = Vec::new();
    let mut pending: Option<u64> = None;

    for line in lines {
        if let Some(attributes) = line.strip_prefix(STREAM_INF_TAG) {
            let bandwidth = bandwidth_pattern
                .captures(attributes)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0);
            pending = Some(bandwidth);
        } else if line.starts_with('#') {
            continue;
        } else if let Some(bandwidth) = pending.take() {
            variants.push(Variant {
                bandwidth,
                uri: line.to_string(),
            });
        }
    }

    Ok(PlaylistDoc::Variants(variants))
}

fn total_duration(durations: impl IntoIterator<Item = Option<f64>>) -> Option<Duration> {
    let mut total = 0.0;
    let mut counted = false;
    for duration in durations {
        let secs = duration.filter(|d| d.is_finite() && *d > 0.0)?;
        total += secs;
        counted = true;
    }
    counted.then(|| Duration::from_secs_f64(total))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segments(uris: &[&str], duration: Option<Duration>) -> PlaylistDoc {
        PlaylistDoc::Segments(SegmentList {
            uris: uris.iter().map(|u| u.to_string()).collect(),
            duration,
        })
    }

    #[test]
    fn test_media_playlist() {
        let doc = parse_playlist(
            "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:10.0,\nseg0.ts\n#EXTINF:10.0,\nseg1.ts\n#EXT-X-ENDLIST\n",
        )
        .unwrap();

        assert_eq!(
            doc,
            segments(&["seg0.ts", "seg1.ts"], Some(Duration::from_secs(20)))
        );
    }

    #[test]
    fn test_master_playlist() {
        let doc = parse_playlist(
            "#EXTM3U\n\
             #EXT-X-STREAM-INF:BANDWIDTH=500000,RESOLUTION=640x360\n\
             low/index.m3u8\n\
             #EXT-X-STREAM-INF:BANDWIDTH=1200000,RESOLUTION=1280x720\n\
             high/index.m3u8\n",
        )
        .unwrap();

        match doc {
            PlaylistDoc::Variants(variants) => {
                assert_eq!(variants.len(), 2);
                assert_eq!(variants[1].bandwidth, 1_200_000);
                assert_eq!(variants[1].uri, "high/index.m3u8");
            }
            other => panic!("expected variants, got {:?}", other),
        }
    }

    #[test]
    fn test_headerless_list_falls_back_to_lines() {
        let doc = parse_playlist("  \n# comment\na.ts\n\nb.ts  \n").unwrap();
        assert_eq!(doc, segments(&["a.ts", "b.ts"], None));
    }

    #[test]
    fn test_line_scan_keeps_durations() {
        let doc = parse_playlist("#EXTINF:2.5,intro
a.ts
#EXTINF:1.5
b.ts
").unwrap();
        assert_eq!(
            doc,
            segments(&["a.ts", "b.ts"], Some(Duration::from_secs(4)))
        );

        // One segment without a duration makes the total unknown
        let doc = parse_playlist("#EXTINF:2.5,
a.ts
b.ts
").unwrap();
        assert_eq!(doc, segments(&["a.ts", "b.ts"], None));
    }

    #[test]
    fn test_headerless_variants() {
        let doc = parse_playlist(
            "#EXT-X-STREAM-INF:PROGRAM-ID=1,BANDWIDTH=800\nmid.m3u8\n#EXT-X-STREAM-INF:AVERAGE-BANDWIDTH=1,BANDWIDTH=900\nhi.m3u8\n",
        )
        .unwrap();
        assert_eq!(
            doc,
            PlaylistDoc::Variants(vec![
                Variant {
                    bandwidth: 800,
                    uri: "mid.m3u8".to_string()
                },
                Variant {
                    bandwidth: 900,
                    uri: "hi.m3u8".to_string()
                },
            ])
        );
    }

    #[test]
    fn test_empty_document_has_no_segments() {
        assert_eq!(parse_playlist("").unwrap(), segments(&[], None));
        assert_eq!(
            parse_playlist("#EXTM3U\n#EXT-X-ENDLIST\n").unwrap(),
            segments(&[], None)
        );
    }
}
