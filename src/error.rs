//! Error types for the streamgrab application.

use thiserror::Error;

/// Main error type for the application.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration value for '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    #[error("Missing required configuration: {0}")]
    MissingConfig(String),

    // Manifest errors
    #[error("Failed to fetch manifest {url}: {message}")]
    ManifestFetch { url: String, message: String },

    #[error("Failed to parse manifest: {0}")]
    ManifestParse(String),

    // Download errors
    #[error("Segment {index} failed after {attempts} attempt(s) ({url}): {message}")]
    SegmentFetch {
        index: usize,
        url: String,
        attempts: u32,
        message: String,
    },

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Request timed out: {url}")]
    Timeout { url: String },

    // Assembly errors
    #[error("Assembly failed: {message}")]
    Assembly {
        message: String,
        diagnostics: Option<String>,
    },

    #[error("FFmpeg not found. Please install ffmpeg and ensure it's in your PATH.")]
    FFmpegNotFound,

    /// The task was cancelled. This is a terminal outcome, not a failure.
    #[error("Task cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),

    // File system errors
    #[error("Invalid filename (path traversal attempt): {0}")]
    InvalidFilename(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // HTTP errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // URL parsing errors
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl Error {
    /// Whether this error represents a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Process exit codes for the CLI.
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const ABORT: i32 = 1;
    pub const BUSY: i32 = 2;
    pub const CONFIG_ERROR: i32 = 3;
    pub const DOWNLOAD_ERROR: i32 = 4;
    pub const ASSEMBLY_ERROR: i32 = 5;
    pub const UNEXPECTED_ERROR: i32 = 6;

    use super::Error;

    /// Exit code for a run that ended with `error`.
    pub fn for_error(error: &Error) -> i32 {
        match error {
            Error::Cancelled => ABORT,
            Error::Config(_)
            | Error::ConfigValidation { .. }
            | Error::MissingConfig(_)
            | Error::TomlParse(_)
            | Error::InvalidFilename(_) => CONFIG_ERROR,
            Error::ManifestFetch { .. }
            | Error::ManifestParse(_)
            | Error::SegmentFetch { .. }
            | Error::HttpStatus { .. }
            | Error::Timeout { .. }
            | Error::Http(_)
            | Error::UrlParse(_) => DOWNLOAD_ERROR,
            Error::Assembly { .. } | Error::FFmpegNotFound => ASSEMBLY_ERROR,
            _ => UNEXPECTED_ERROR,
        }
    }
}
