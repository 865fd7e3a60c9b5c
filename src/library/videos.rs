//! Video directory access

use super::LibraryError;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// File extensions recognized as recordings
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "flv", "mkv", "avi"];

/// Check if a file name has a video extension
pub fn is_video_file(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Recordings stored in one directory
#[derive(Debug, Clone)]
pub struct VideoLibrary {
    root: PathBuf,
}

impl VideoLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Names of all recordings, sorted
    pub fn list(&self) -> Result<Vec<String>, LibraryError> {
        let entries = fs::read_dir(&self.root).map_err(|source| {
            tracing::error!("Failed to read storage directory: {}", source);
            LibraryError::ReadDir {
                path: self.root.clone(),
                source,
            }
        })?;

        let mut videos: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().map(|t| !t.is_dir()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| is_video_file(name))
            .collect();
        videos.sort();

        tracing::info!("Found {} videos", videos.len());
        Ok(videos)
    }

    /// Path of the recording called `name`
    ///
    /// Only bare file names are accepted, so a request can never reach
    /// outside the library directory.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, LibraryError> {
        let mut components = Path::new(name).components();
        let is_bare_name = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !is_bare_name || name.contains('\\') {
            return Err(LibraryError::InvalidName(name.to_string()));
        }

        let path = self.root.join(name);
        if !path.is_file() {
            tracing::warn!("Requested video does not exist: {:?}", path);
            return Err(LibraryError::NotFound(name.to_string()));
        }

        Ok(path)
    }
}
