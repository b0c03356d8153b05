//! Configuration structures and loading logic.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub download: DownloadConfig,

    #[serde(default)]
    pub assembly: AssemblyConfig,

    #[serde(default)]
    pub progress: ProgressConfig,

    #[serde(default)]
    pub log: LogConfig,
}

/// HTTP request configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Browser user agent string sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Referer header sent with every request.
    #[serde(default)]
    pub referer: Option<String>,

    /// Timeout for a single manifest fetch.
    #[serde(default = "default_manifest_timeout")]
    pub manifest_timeout_secs: u64,

    /// Timeout for a single segment fetch attempt.
    #[serde(default = "default_segment_timeout")]
    pub segment_timeout_secs: u64,
}

/// Segment download configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Worker pool width (segments fetched per batch).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Attempts per segment before the whole fetch fails.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay between attempts. Zero retries immediately.
    #[serde(default)]
    pub retry_backoff_ms: u64,

    /// Where per-task segment directories are created.
    /// Defaults to the directory of the output file.
    #[serde(default)]
    pub work_directory: Option<PathBuf>,

    /// How many nested variant manifests are followed.
    #[serde(default = "default_max_manifest_depth")]
    pub max_manifest_depth: usize,
}

/// External remux configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyConfig {
    /// Path or name of the ffmpeg executable.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Audio bitstream filter applied during stream copy. Empty disables it.
    #[serde(default = "default_audio_bsf")]
    pub audio_bitstream_filter: String,
}

/// Progress reporting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Minimum time between two progress emissions.
    #[serde(default = "default_min_interval")]
    pub min_interval_ms: u64,

    /// Capacity of the per-task event channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

/// In-process log buffer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Number of lines retained before the oldest are trimmed.
    #[serde(default = "default_log_capacity")]
    pub capacity: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            referer: None,
            manifest_timeout_secs: default_manifest_timeout(),
            segment_timeout_secs: default_segment_timeout(),
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: 0,
            work_directory: None,
            max_manifest_depth: default_max_manifest_depth(),
        }
    }
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            audio_bitstream_filter: default_audio_bsf(),
        }
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            capacity: default_log_capacity(),
        }
    }
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

fn default_manifest_timeout() -> u64 {
    10
}

fn default_segment_timeout() -> u64 {
    30
}

fn default_concurrency() -> usize {
    8
}

fn default_max_attempts() -> u32 {
    3
}

fn default_max_manifest_depth() -> usize {
    5
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_audio_bsf() -> String {
    "aac_adtstoasc".to_string()
}

fn default_min_interval() -> u64 {
    250
}

fn default_channel_capacity() -> usize {
    64
}

fn default_log_capacity() -> usize {
    85
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::Config(format!("Configuration file not found: {}", path.display()))
            } else {
                Error::Io(e)
            }
        })?;

        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Platform config location (`~/.config/streamgrab/config.toml` on Linux).
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "streamgrab").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn manifest_timeout(&self) -> Duration {
        Duration::from_secs(self.network.manifest_timeout_secs)
    }

    pub fn segment_timeout(&self) -> Duration {
        Duration::from_secs(self.network.segment_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.download.retry_backoff_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress.min_interval_ms)
    }

    /// Directory that holds per-task work directories for a given output file.
    pub fn work_root(&self, output_path: &Path) -> PathBuf {
        if let Some(dir) = &self.download.work_directory {
            return dir.clone();
        }
        match output_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}
