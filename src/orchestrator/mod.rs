//! Orchestration module
//!
//! The single entry point for HTTP handlers and the hardware button:
//! serializes start/stop against the supervisor and announces every
//! transition through the broadcast hub.

pub mod facade;
pub mod status;

pub use facade::{ButtonToggle, Orchestrator};
pub use status::{StatusEvent, StatusMessage};
