//! Manifest module.
//!
//! Provides:
//! - Playlist parsing (media and variant playlists)
//! - Recursive resolution to a single ordered segment list

pub mod parser;
pub mod resolver;

pub use parser::{parse_playlist, PlaylistDoc, SegmentList, Variant};
pub use resolver::{resolve_reference, select_variant, Manifest, ManifestResolver};
