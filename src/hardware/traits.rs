//! Hardware trait definitions
//!
//! Platform-agnostic seams between the debounce loop, the physical input
//! it polls and the action it triggers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;

/// Logic level of a digital input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Low,
    High,
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Low => write!(f, "low"),
            Level::High => write!(f, "high"),
        }
    }
}

/// A digital input that can be sampled synchronously
pub trait InputSource: Send + Sync {
    /// Read the current logic level
    fn read(&self) -> io::Result<Level>;
}

impl<T: InputSource + ?Sized> InputSource for std::sync::Arc<T> {
    fn read(&self) -> io::Result<Level> {
        (**self).read()
    }
}

/// Action run on a confirmed press
pub trait EdgeHandler: Send + Sync {
    fn on_press(&self);
}

impl<F> EdgeHandler for F
where
    F: Fn() + Send + Sync,
{
    fn on_press(&self) {
        self()
    }
}
