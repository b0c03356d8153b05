//! Network module.
//!
//! This module provides:
//! - The `Transport` seam used by the resolver and fetchers
//! - A reqwest-backed transport
//! - Per-task request headers

pub mod client;
pub mod headers;

#[cfg(test)]
pub mod testing;

pub use client::{ByteStream, HttpTransport, Transport};
pub use headers::{parse_header_arg, RequestHeaders};
