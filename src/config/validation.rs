//! Configuration validation logic.

use regex::Regex;
use reqwest::header::HeaderValue;

use crate::config::loader::Config;
use crate::error::{Error, Result};

/// Upper bound on the segment worker pool.
const MAX_CONCURRENCY: usize = 64;

/// Upper bound on attempts per segment.
const MAX_ATTEMPTS: u32 = 10;

/// Upper bound on nested manifest depth.
const MAX_MANIFEST_DEPTH: usize = 16;

/// Validate the entire configuration.
pub fn validate_config(config: &Config) -> Result<()> {
    validate_concurrency(config.download.concurrency)?;
    validate_attempts(config.download.max_attempts)?;
    validate_timeout("manifest_timeout_secs", config.network.manifest_timeout_secs)?;
    validate_timeout("segment_timeout_secs", config.network.segment_timeout_secs)?;
    validate_header_value("user_agent", &config.network.user_agent)?;
    if let Some(referer) = &config.network.referer {
        validate_header_value("referer", referer)?;
    }
    validate_depth(config.download.max_manifest_depth)?;
    validate_ffmpeg(config)?;

    if config.progress.channel_capacity == 0 {
        return Err(Error::ConfigValidation {
            field: "channel_capacity".to_string(),
            message: "Event channel capacity must be at least 1".to_string(),
        });
    }

    if config.log.capacity == 0 {
        return Err(Error::ConfigValidation {
            field: "log.capacity".to_string(),
            message: "Log buffer must hold at least one line".to_string(),
        });
    }

    Ok(())
}

/// Validate the worker pool width.
pub fn validate_concurrency(concurrency: usize) -> Result<()> {
    if concurrency == 0 || concurrency > MAX_CONCURRENCY {
        return Err(Error::ConfigValidation {
            field: "concurrency".to_string(),
            message: format!(
                "Concurrency must be between 1 and {} (got {})",
                MAX_CONCURRENCY, concurrency
            ),
        });
    }
    Ok(())
}

/// Validate the per-segment attempt budget.
pub fn validate_attempts(attempts: u32) -> Result<()> {
    if attempts == 0 || attempts > MAX_ATTEMPTS {
        return Err(Error::ConfigValidation {
            field: "max_attempts".to_string(),
            message: format!(
                "Attempts must be between 1 and {} (got {})",
                MAX_ATTEMPTS, attempts
            ),
        });
    }
    Ok(())
}

fn validate_timeout(field: &str, secs: u64) -> Result<()> {
    if secs == 0 {
        return Err(Error::ConfigValidation {
            field: field.to_string(),
            message: "Timeout must be at least one second".to_string(),
        });
    }
    Ok(())
}

fn validate_depth(depth: usize) -> Result<()> {
    if depth == 0 || depth > MAX_MANIFEST_DEPTH {
        return Err(Error::ConfigValidation {
            field: "max_manifest_depth".to_string(),
            message: format!(
                "Manifest depth must be between 1 and {} (got {})",
                MAX_MANIFEST_DEPTH, depth
            ),
        });
    }
    Ok(())
}

/// Validate that a value can be sent as an HTTP header.
pub fn validate_header_value(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::MissingConfig(field.to_string()));
    }
    HeaderValue::from_str(value).map_err(|_| Error::ConfigValidation {
        field: field.to_string(),
        message: "Value contains characters not allowed in HTTP headers".to_string(),
    })?;
    Ok(())
}

fn validate_ffmpeg(config: &Config) -> Result<()> {
    if config.assembly.ffmpeg_path.as_os_str().is_empty() {
        return Err(Error::MissingConfig("ffmpeg_path".to_string()));
    }

    let filter = &config.assembly.audio_bitstream_filter;
    if !filter.is_empty() {
        // Bitstream filter names with optional `=key=value` options
        let pattern = Regex::new(r"^[a-z0-9_]+(=[A-Za-z0-9_:=.]+)?(,[a-z0-9_]+(=[A-Za-z0-9_:=.]+)?)*$")
            .map_err(|e| Error::Config(format!("Invalid filter pattern: {}", e)))?;
        if !pattern.is_match(filter) {
            return Err(Error::ConfigValidation {
                field: "audio_bitstream_filter".to_string(),
                message: format!("'{}' is not a valid bitstream filter chain", filter),
            });
        }
    }

    Ok(())
}
