//! GPIO input through the sysfs interface
//!
//! The legacy `/sys/class/gpio` interface cannot configure bias; the pull-up
//! for the button has to come from the board or its boot configuration.

use super::traits::{InputSource, Level};
use super::HardwareError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Default sysfs GPIO root
pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// A GPIO line configured as input
#[derive(Debug)]
pub struct SysfsPin {
    pin: u32,
    root: PathBuf,
    value_path: PathBuf,
    exported: bool,
}

impl SysfsPin {
    /// Export `pin` and configure it as an input
    pub fn open(pin: u32) -> Result<Self, HardwareError> {
        Self::open_at(Path::new(SYSFS_GPIO_ROOT), pin)
    }

    /// Same as `open` with a custom sysfs root
    pub fn open_at(root: &Path, pin: u32) -> Result<Self, HardwareError> {
        let gpio_err = |source| HardwareError::Gpio { pin, source };
        let pin_dir = root.join(format!("gpio{}", pin));

        let mut exported = false;
        if !pin_dir.exists() {
            fs::write(root.join("export"), pin.to_string()).map_err(gpio_err)?;
            exported = true;
        }

        fs::write(pin_dir.join("direction"), "in").map_err(gpio_err)?;

        let gpio = Self {
            pin,
            root: root.to_path_buf(),
            value_path: pin_dir.join("value"),
            exported,
        };

        let level = gpio.read().map_err(gpio_err)?;
        tracing::info!("GPIO pin {} initialized as input (level {})", pin, level);
        Ok(gpio)
    }
}

/// Parse the content of a sysfs `value` file
pub fn parse_value(raw: &str) -> Result<Level, HardwareError> {
    match raw.trim() {
        "0" => Ok(Level::Low),
        "1" => Ok(Level::High),
        other => Err(HardwareError::InvalidValue(other.to_string())),
    }
}

impl InputSource for SysfsPin {
    fn read(&self) -> io::Result<Level> {
        let raw = fs::read_to_string(&self.value_path)?;
        parse_value(&raw).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

impl Drop for SysfsPin {
    fn drop(&mut self) {
        if self.exported {
            if let Err(e) = fs::write(self.root.join("unexport"), self.pin.to_string()) {
                tracing::warn!("Failed to unexport GPIO pin {}: {}", self.pin, e);
            } else {
                tracing::info!("GPIO pin {} released", self.pin);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fake_pin(root: &Path, pin: u32, value: &str) -> PathBuf {
        let dir = root.join(format!("gpio{}", pin));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("direction"), "out").unwrap();
        fs::write(dir.join("value"), value).unwrap();
        dir
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("0\n").unwrap(), Level::Low);
        assert_eq!(parse_value("1").unwrap(), Level::High);
        assert!(matches!(parse_value("x"), Err(HardwareError::InvalidValue(_))));
    }

    #[test]
    fn test_open_configures_input_and_reads() {
        let root = tempdir().unwrap();
        let dir = fake_pin(root.path(), 18, "1\n");

        let pin = SysfsPin::open_at(root.path(), 18).unwrap();
        assert_eq!(fs::read_to_string(dir.join("direction")).unwrap(), "in");
        assert_eq!(pin.read().unwrap(), Level::High);

        fs::write(dir.join("value"), "0\n").unwrap();
        assert_eq!(pin.read().unwrap(), Level::Low);
    }

    #[test]
    fn test_garbage_value_is_an_io_error() {
        let root = tempdir().unwrap();
        let dir = fake_pin(root.path(), 5, "1");
        let pin = SysfsPin::open_at(root.path(), 5).unwrap();

        fs::write(dir.join("value"), "?").unwrap();
        assert_eq!(pin.read().unwrap_err().kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_missing_pin_fails() {
        let root = tempdir().unwrap();
        let result = SysfsPin::open_at(root.path(), 23);
        assert!(matches!(result, Err(HardwareError::Gpio { pin: 23, .. })));
    }
}
