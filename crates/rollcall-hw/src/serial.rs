//! Serial link to the indicator device.
//!
//! The port is opened non-blocking and switched to raw 8N1 at the requested
//! baud rate. Writes are single attempts: if the device cannot take the
//! token immediately the write fails and the caller logs it.

use nix::sys::termios::{self, BaudRate, FlushArg, SetArg};
use rollcall_core::SignalLink;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BAUD: u32 = 9600;

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("failed to open serial port {path}: {source}")]
    Open { path: String, source: io::Error },
    #[error("failed to configure serial port: {0}")]
    Configure(#[from] nix::Error),
    #[error("unsupported baud rate: {0}")]
    UnsupportedBaud(u32),
}

fn baud_rate(baud: u32) -> Result<BaudRate, SignalError> {
    Ok(match baud {
        1200 => BaudRate::B1200,
        2400 => BaudRate::B2400,
        4800 => BaudRate::B4800,
        9600 => BaudRate::B9600,
        19200 => BaudRate::B19200,
        38400 => BaudRate::B38400,
        57600 => BaudRate::B57600,
        115200 => BaudRate::B115200,
        other => return Err(SignalError::UnsupportedBaud(other)),
    })
}

pub struct SerialLink {
    file: File,
    path: String,
}

impl SerialLink {
    /// Open and configure the port, then wait `settle` for the device to
    /// finish its reset-on-open before discarding any buffered bytes.
    pub fn open(path: &str, baud: u32, settle: Duration) -> Result<Self, SignalError> {
        let speed = baud_rate(baud)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(path)
            .map_err(|source| SignalError::Open {
                path: path.to_string(),
                source,
            })?;

        let mut tio = termios::tcgetattr(&file)?;
        termios::cfmakeraw(&mut tio);
        termios::cfsetspeed(&mut tio, speed)?;
        termios::tcsetattr(&file, SetArg::TCSANOW, &tio)?;

        if !settle.is_zero() {
            std::thread::sleep(settle);
        }
        termios::tcflush(&file, FlushArg::TCIOFLUSH)?;

        tracing::info!(port = path, baud, "signal link connected");
        Ok(Self {
            file,
            path: path.to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl SignalLink for SerialLink {
    fn write_token(&mut self, token: &[u8]) -> io::Result<()> {
        self.file.write_all(token)
    }

    fn is_connected(&self) -> bool {
        true
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        tracing::info!(port = %self.path, "signal link disconnected");
    }
}
