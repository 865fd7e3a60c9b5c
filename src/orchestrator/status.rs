//! Status messages sent to observers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of stream transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusEvent {
    /// Stream started on request
    Started,
    /// Stream stopped on request
    Stopped,
    /// Encoder died without being asked to
    Exited,
}

/// A status update as delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMessage {
    pub event: StatusEvent,

    /// Human readable summary
    pub message: String,

    /// Whether the stream is live after this transition
    pub streaming: bool,

    /// Encoder exit code, for `Exited`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,

    pub timestamp: DateTime<Utc>,
}

impl StatusMessage {
    pub fn started() -> Self {
        Self::new(StatusEvent::Started, "Stream started", true, None)
    }

    pub fn stopped() -> Self {
        Self::new(StatusEvent::Stopped, "Stream stopped", false, None)
    }

    pub fn exited(code: Option<i32>, streaming: bool) -> Self {
        let message = match code {
            Some(code) => format!("Stream exited with code {}", code),
            None => "Stream exited".to_string(),
        };
        Self::new(StatusEvent::Exited, message, streaming, code)
    }

    fn new(event: StatusEvent, message: impl Into<String>, streaming: bool, code: Option<i32>) -> Self {
        Self {
            event,
            message: message.into(),
            streaming,
            code,
            timestamp: Utc::now(),
        }
    }
}
