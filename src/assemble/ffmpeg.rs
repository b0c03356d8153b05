//! Stream-copy remux of ordered segments through ffmpeg.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{ChildStdout, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::assemble::concat::write_concat_list;
use crate::config::AssemblyConfig;
use crate::error::{Error, Result};
use crate::fs::{publish_artifact, staged_file_name};
use crate::resources::{ResourceKind, ResourceSet, TokenHandle};

/// Lines of ffmpeg stderr kept in an assembly error.
const DIAGNOSTIC_LINES: usize = 20;

/// Key of the `-progress` output holding the written media time.
const OUT_TIME_KEY: &str = "out_time_us=";

/// Runs the external remux process.
#[derive(Debug, Clone)]
pub struct Assembler {
    ffmpeg: PathBuf,
    audio_filter: Option<String>,
}

impl Assembler {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            audio_filter: None,
        }
    }

    /// Audio bitstream filter applied during the copy; `None` disables it.
    pub fn with_audio_filter(mut self, filter: Option<String>) -> Self {
        self.audio_filter = filter.filter(|f| !f.is_empty());
        self
    }

    pub fn from_config(config: &AssemblyConfig) -> Self {
        Self::new(&config.ffmpeg_path)
            .with_audio_filter(Some(config.audio_bitstream_filter.clone()))
    }

    /// Arguments for concatenating `list` into `staged` without re-encoding.
    pub fn command_args(&self, list: &Path, staged: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-nostats",
            "-progress",
            "pipe:1",
            "-y",
            "-f",
            "concat",
            "-safe",
            "0",
            "-i",
        ]
        .iter()
        .map(OsString::from)
        .collect();
        args.push(list.as_os_str().to_owned());
        args.push("-c".into());
        args.push("copy".into());
        if let Some(filter) = &self.audio_filter {
            args.push("-bsf:a".into());
            args.push(filter.into());
        }
        args.push(staged.as_os_str().to_owned());
        args
    }

    /// Concatenate `segments` (already in playback order) into `output`.
    ///
    /// The list and the staged file live in `work_dir`; only a zero exit
    /// moves the result to `output`, replacing whatever was there. Firing
    /// `cancel` or terminating `resources` kills the process and yields
    /// [`Error::Cancelled`]. `on_progress` receives the media time ffmpeg
    /// has written so far.
    pub async fn assemble(
        &self,
        segments: &[PathBuf],
        work_dir: &Path,
        output: &Path,
        cancel: &CancellationToken,
        resources: &ResourceSet,
        mut on_progress: impl FnMut(Duration),
    ) -> Result<PathBuf> {
        if segments.is_empty() {
            return Err(Error::Assembly {
                message: "no segments to assemble".to_string(),
                diagnostics: None,
            });
        }

        let list = write_concat_list(segments, work_dir).await?;
        let staged = work_dir.join(staged_file_name(output));

        let process = cancel.child_token();
        let _guard = resources.register(TokenHandle::new(ResourceKind::Process, process.clone()));
        if process.is_cancelled() {
            return Err(Error::Cancelled);
        }

        tracing::info!(
            "Assembling {} segments into {}",
            segments.len(),
            output.display()
        );

        let mut child = Command::new(&self.ffmpeg)
            .args(self.command_args(&list, &staged))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::FFmpegNotFound
                } else {
                    Error::Assembly {
                        message: format!("Failed to run ffmpeg: {}", e),
                        diagnostics: None,
                    }
                }
            })?;

        let stderr = child.stderr.take();
        let stderr_reader = tokio::spawn(async move {
            let mut raw = Vec::new();
            if let Some(mut stderr) = stderr {
                if let Err(e) = stderr.read_to_end(&mut raw).await {
                    tracing::debug!("Failed to read ffmpeg stderr: {}", e);
                }
            }
            String::from_utf8_lossy(&raw).into_owned()
        });

        let (progress_tx, mut progress_rx) = mpsc::channel(16);
        let progress_reader = child
            .stdout
            .take()
            .map(|stdout| tokio::spawn(read_progress(stdout, progress_tx)));

        let status = loop {
            tokio::select! {
                biased;
                _ = process.cancelled() => {
                    if let Err(e) = child.kill().await {
                        tracing::warn!("Failed to kill ffmpeg: {}", e);
                    }
                    stderr_reader.abort();
                    if let Some(reader) = &progress_reader {
                        reader.abort();
                    }
                    tracing::info!("Assembly cancelled, ffmpeg killed");
                    return Err(Error::Cancelled);
                }
                Some(out_time) = progress_rx.recv() => on_progress(out_time),
                status = child.wait() => break status?,
            }
        };

        // Lines still buffered when the process exited
        while let Some(out_time) = progress_rx.recv().await {
            on_progress(out_time);
        }
        let stderr = stderr_reader.await.unwrap_or_default();

        if !status.success() {
            tracing::error!("ffmpeg exited with {}", status);
            return Err(Error::Assembly {
                message: format!("ffmpeg exited with {}", status),
                diagnostics: tail_lines(&stderr, DIAGNOSTIC_LINES),
            });
        }

        publish_artifact(&staged, output).await?;
        tracing::debug!("Published {}", output.display());

        Ok(output.to_path_buf())
    }
}

/// Forward every `out_time_us` value of ffmpeg's `-progress` output.
async fn read_progress(stdout: ChildStdout, progress: mpsc::Sender<Duration>) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Some(out_time) = parse_out_time(&line) {
                    if progress.send(out_time).await.is_err() {
                        return;
                    }
                }
            }
            Ok(None) => return,
            Err(e) => {
                tracing::debug!("Failed to read ffmpeg progress: {}", e);
                return;
            }
        }
    }
}

/// `out_time_us=12000000` as a duration. `N/A` and other keys yield `None`.
fn parse_out_time(line: &str) -> Option<Duration> {
    line.trim()
        .strip_prefix(OUT_TIME_KEY)?
        .parse::<u64>()
        .ok()
        .map(Duration::from_micros)
}

fn tail_lines(text: &str, count: usize) -> Option<String> {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return None;
    }
    let start = lines.len().saturating_sub(count);
    Some(lines[start..].join("\n"))
}
