//! Vibration device link.
//!
//! The device is an optional extra: when the port cannot be opened the host
//! runs speech-only and actuator commands are dropped.

use tracing::{info, warn};

use super::ActuatorLink;
#[cfg(feature = "serial")]
use crate::error::{GuidanceError, Result};

/// Serial port settings for the vibration device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActuatorConfig {
    pub enabled: bool,
    /// OS port name, e.g. `COM3` or `/dev/ttyUSB0`.
    pub port: String,
    /// Default: 9600.
    pub baud_rate: u32,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: "COM3".into(),
            baud_rate: 9_600,
        }
    }
}

#[cfg(feature = "serial")]
pub struct SerialActuator {
    port: Box<dyn serialport::SerialPort>,
}

#[cfg(feature = "serial")]
impl SerialActuator {
    pub fn open(config: &ActuatorConfig) -> Result<Self> {
        let port = serialport::new(config.port.as_str(), config.baud_rate)
            .timeout(std::time::Duration::from_millis(100))
            .open()
            .map_err(|e| GuidanceError::Actuator(format!("{}: {e}", config.port)))?;
        Ok(Self { port })
    }
}

#[cfg(feature = "serial")]
impl ActuatorLink for SerialActuator {
    fn send(&mut self, byte: u8) -> Result<()> {
        use std::io::Write;

        self.port.write_all(&[byte])?;
        self.port.flush()?;
        Ok(())
    }
}

/// Try to connect to the vibration device. Returns `None` (and logs why) when
/// it is disabled or unreachable.
pub fn open_actuator(config: &ActuatorConfig) -> Option<Box<dyn ActuatorLink>> {
    if !config.enabled {
        info!("actuator disabled");
        return None;
    }

    #[cfg(feature = "serial")]
    {
        match SerialActuator::open(config) {
            Ok(link) => {
                info!(port = %config.port, baud = config.baud_rate, "actuator connected");
                Some(Box::new(link))
            }
            Err(e) => {
                warn!("actuator not connected ({e}); continuing without vibration");
                None
            }
        }
    }

    #[cfg(not(feature = "serial"))]
    {
        warn!(
            port = %config.port,
            "built without the `serial` feature; continuing without vibration"
        );
        None
    }
}
