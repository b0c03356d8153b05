//! Assembly of fetched segments into one container.

pub mod concat;
pub mod ffmpeg;

pub use concat::{render_concat_list, write_concat_list, CONCAT_LIST_NAME};
pub use ffmpeg::Assembler;
