//! Command-line argument definitions using clap.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::config::Config;
use crate::error::Result;
use crate::net::{parse_header_arg, RequestHeaders};
use crate::task::{SourceKind, TaskId, TaskRequest};

/// Segmented media downloader CLI.
#[derive(Parser, Debug)]
#[command(
    name = "streamgrab",
    version,
    about = "Download HLS streams and media files into a single playable file",
    long_about = "Resolves an HLS playlist (picking the highest-bandwidth variant), fetches every \
                  segment in parallel with per-segment retry, and remuxes them in order with ffmpeg.\n\n\
                  URLs that are not playlists are streamed straight to the output file."
)]
pub struct Args {
    /// Playlist or media URL.
    pub url: String,

    /// Output file.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Task identifier (random when omitted).
    #[arg(long = "task-id")]
    pub task_id: Option<String>,

    /// Referer header sent with every request.
    #[arg(short, long, env = "STREAMGRAB_REFERER")]
    pub referer: Option<String>,

    /// User agent sent with every request.
    #[arg(short = 'a', long = "user-agent", env = "STREAMGRAB_USER_AGENT")]
    pub user_agent: Option<String>,

    /// Extra request header, e.g. "Cookie: a=b". May be repeated.
    #[arg(short = 'H', long = "header", value_name = "NAME: VALUE")]
    pub headers: Vec<String>,

    /// Segments fetched in parallel.
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Attempts per segment, including the first.
    #[arg(long)]
    pub retries: Option<u32>,

    /// Path to the ffmpeg binary.
    #[arg(long)]
    pub ffmpeg: Option<PathBuf>,

    /// Directory for temporary segment files.
    #[arg(long = "work-dir")]
    pub work_dir: Option<PathBuf>,

    /// How to treat the URL.
    #[arg(long, value_enum, default_value_t = KindArg::Auto)]
    pub kind: KindArg,

    /// Path to configuration file (defaults to the per-user config).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Print events as JSON lines on stdout.
    #[arg(long)]
    pub json: bool,

    /// Hide progress information.
    #[arg(long, short)]
    pub quiet: bool,

    /// Enable debug logging.
    #[arg(long)]
    pub debug: bool,
}

/// CLI source kind argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    /// Decide from the URL (".m3u8" means playlist).
    Auto,
    /// Always resolve as an HLS playlist.
    Hls,
    /// Always stream as a single file.
    Direct,
}

impl From<KindArg> for SourceKind {
    fn from(arg: KindArg) -> Self {
        match arg {
            KindArg::Auto => SourceKind::Auto,
            KindArg::Hls => SourceKind::Hls,
            KindArg::Direct => SourceKind::Direct,
        }
    }
}

impl Args {
    /// Merge CLI arguments into an existing config, overriding where specified.
    pub fn merge_into_config(&self, config: &mut Config) {
        if let Some(user_agent) = &self.user_agent {
            config.network.user_agent = user_agent.clone();
        }

        if let Some(referer) = &self.referer {
            config.network.referer = Some(referer.clone());
        }

        if let Some(concurrency) = self.concurrency {
            config.download.concurrency = concurrency;
        }

        if let Some(retries) = self.retries {
            config.download.max_attempts = retries;
        }

        if let Some(dir) = &self.work_dir {
            config.download.work_directory = Some(dir.clone());
        }

        if let Some(ffmpeg) = &self.ffmpeg {
            config.assembly.ffmpeg_path = ffmpeg.clone();
        }
    }

    /// Build the task request, with headers from `config` plus `--header`.
    pub fn into_request(self, config: &Config) -> Result<TaskRequest> {
        let mut headers = RequestHeaders::from_config(&config.network);
        for raw in &self.headers {
            let (name, value) = parse_header_arg(raw)?;
            headers = headers.with_header(name, value);
        }

        let task_id = self
            .task_id
            .map(TaskId::from)
            .unwrap_or_else(TaskId::generate);

        Ok(TaskRequest::new(task_id, self.url, self.output)
            .with_headers(headers)
            .with_kind(self.kind.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = Args::try_parse_from([
            "streamgrab",
            "https://cdn.example/master.m3u8",
            "-o",
            "out.mp4",
            "-j",
            "4",
            "--retries",
            "5",
            "--referer",
            "https://site.example/",
            "--ffmpeg",
            "/opt/ffmpeg",
        ])
        .unwrap();

        let mut config = Config::default();
        args.merge_into_config(&mut config);

        assert_eq!(config.download.concurrency, 4);
        assert_eq!(config.download.max_attempts, 5);
        assert_eq!(config.network.referer.as_deref(), Some("https://site.example/"));
        assert_eq!(config.assembly.ffmpeg_path, PathBuf::from("/opt/ffmpeg"));
    }

    #[test]
    fn test_into_request() {
        let args = Args::try_parse_from([
            "streamgrab",
            "https://cdn.example/clip",
            "-o",
            "clip.mp4",
            "--task-id",
            "77",
            "--kind",
            "direct",
            "-H",
            "Cookie: session=1",
        ])
        .unwrap();

        let request = args.into_request(&Config::default()).unwrap();

        assert_eq!(request.task_id, TaskId::from("77"));
        assert_eq!(request.kind, SourceKind::Direct);
        assert_eq!(request.output, PathBuf::from("clip.mp4"));
        assert_eq!(
            request.headers.extra,
            vec![("Cookie".to_string(), "session=1".to_string())]
        );
        assert!(request.headers.user_agent.is_some());
    }

    #[test]
    fn test_malformed_header_is_rejected() {
        let args = Args::try_parse_from([
            "streamgrab",
            "https://cdn.example/a.m3u8",
            "-o",
            "a.mp4",
            "-H",
            "no-colon-here",
        ])
        .unwrap();

        assert!(args.into_request(&Config::default()).is_err());
    }
}
