//! Configuration module for streamgrab.
//!
//! This module handles:
//! - Loading configuration from TOML files
//! - Defaults for timeouts, worker pool width and retry budget
//! - Configuration validation

pub mod loader;
pub mod validation;

pub use loader::{
    AssemblyConfig, Config, DownloadConfig, LogConfig, NetworkConfig, ProgressConfig,
};
pub use validation::{validate_config, validate_header_value};
