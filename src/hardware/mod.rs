//! Hardware input module
//!
//! Turns a polled, bouncy button line into clean press events:
//! - InputSource / EdgeHandler traits at the hardware seam
//! - DebounceMonitor polling loop and its InputEdgeState machine
//! - SysfsPin, a GPIO line read through /sys/class/gpio

pub mod debounce;
pub mod gpio;
pub mod traits;

pub use debounce::{DebounceMonitor, DebounceSettings, EdgePhase, InputEdgeState};
pub use gpio::SysfsPin;
pub use traits::{EdgeHandler, InputSource, Level};

use thiserror::Error;

/// Errors raised while setting up hardware inputs
#[derive(Error, Debug)]
pub enum HardwareError {
    #[error("GPIO pin {pin}: {source}")]
    Gpio {
        pin: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Unexpected GPIO value {0:?}")]
    InvalidValue(String),
}
