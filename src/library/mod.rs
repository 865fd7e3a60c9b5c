//! Recorded video library
//!
//! Enumerates and resolves recordings stored in the video directory.

pub mod videos;

pub use videos::{is_video_file, VideoLibrary, VIDEO_EXTENSIONS};

use thiserror::Error;

/// Video library errors
#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Failed to read video directory {path:?}: {source}")]
    ReadDir {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Video not found: {0}")]
    NotFound(String),

    #[error("Invalid video name: {0}")]
    InvalidName(String),
}
