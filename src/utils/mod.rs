//! Shared utilities
//!
//! Error types and runtime configuration used across the crate.

pub mod config;
pub mod error;

pub use config::AppConfig;
pub use error::{AppError, AppResult, ErrorResponse};
