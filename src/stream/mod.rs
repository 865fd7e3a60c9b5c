//! Live stream module
//!
//! Owns the external encoder process that produces the HLS output:
//! - EncoderSettings / EncoderCommand describe the fixed command line
//! - StreamSupervisor starts, watches and terminates the process

pub mod encoder;
pub mod state;
pub mod supervisor;

pub use encoder::{EncoderCommand, EncoderSettings, PLAYLIST_NAME};
pub use state::{StreamError, StreamResult, StreamStatus, SupervisorEvent};
pub use supervisor::StreamSupervisor;
