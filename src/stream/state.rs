//! Stream state and errors
//!
//! Status snapshots, lifecycle events and the error type of the supervisor.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that prevent a requested stream transition
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Failed to launch encoder '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Refusing to start encoder: shutdown in progress")]
    ShuttingDown,

    #[error("Previous encoder (pid {pid:?}) did not exit within {waited:?}")]
    StillStopping {
        pid: Option<u32>,
        waited: std::time::Duration,
    },

    #[error("Failed to prepare output directory {path:?}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type StreamResult<T> = Result<T, StreamError>;

/// Point-in-time view of the stream session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStatus {
    /// Whether an encoder process is live
    pub running: bool,
    /// OS process id of the live encoder
    pub pid: Option<u32>,
    /// Launch counter of the live encoder
    pub generation: Option<u64>,
    /// Playlist the encoder writes
    pub playlist: PathBuf,
}

/// Lifecycle events emitted by the supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// A new encoder process was spawned
    Launched { generation: u64, pid: Option<u32> },
    /// An encoder process was reaped
    Exited {
        generation: u64,
        /// Exit code, `None` when terminated by a signal or not observable
        code: Option<i32>,
        /// Whether the exit followed a stop request or scope cancellation
        requested: bool,
    },
}
