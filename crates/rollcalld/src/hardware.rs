use rollcall_core::{FaceOracle, OracleError, SignalLink};
use rollcall_hw::{Camera, CameraError, FrameSource, SerialLink};
use std::time::Duration;

use crate::config::Config;
use crate::oracle::ProcessOracle;
use crate::session::SessionDevices;

/// Real devices: V4L2 camera, oracle child process, serial indicator.
pub struct Hardware {
    camera_device: String,
    oracle_command: String,
    oracle_timeout: Duration,
    signal_port: String,
    signal_baud: u32,
    signal_settle: Duration,
}

impl Hardware {
    pub fn from_config(config: &Config) -> Self {
        Self {
            camera_device: config.camera_device.clone(),
            oracle_command: config.oracle_command.clone(),
            oracle_timeout: config.oracle_timeout,
            signal_port: config.signal_port.clone(),
            signal_baud: config.signal_baud,
            signal_settle: config.signal_settle,
        }
    }
}

impl SessionDevices for Hardware {
    fn open_source(&self) -> Result<Box<dyn FrameSource + Send>, CameraError> {
        let camera = Camera::open(&self.camera_device)?;
        Ok(Box::new(camera))
    }

    fn open_oracle(&self) -> Result<Box<dyn FaceOracle + Send>, OracleError> {
        let oracle = ProcessOracle::from_command_line(&self.oracle_command)?
            .with_reply_timeout(self.oracle_timeout);
        Ok(Box::new(oracle))
    }

    fn open_link(&self) -> Option<Box<dyn SignalLink + Send>> {
        match SerialLink::open(&self.signal_port, self.signal_baud, self.signal_settle) {
            Ok(link) => Some(Box::new(link)),
            Err(err) => {
                tracing::warn!(
                    port = %self.signal_port,
                    error = %err,
                    "signal link unavailable; continuing without indicator"
                );
                None
            }
        }
    }
}
