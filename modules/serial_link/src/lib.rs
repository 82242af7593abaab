// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! Serial link of the GNSS logger
//!
//! Owns everything that touches the serial device: discovery, permission
//! negotiation, opening with the line settings of the deployment, reading with
//! a bounded timeout and closing.

use common::device::{DeviceDescriptor, DeviceId};
use std::{
    fmt,
    io::{self, ErrorKind},
    str::FromStr,
    sync::{Arc, Mutex},
    time::Duration,
};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

pub mod hotplug;
pub mod system;
pub mod test_helper;

/// Number of data bits per character.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl TryFrom<u8> for DataBits {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            5 => Ok(DataBits::Five),
            6 => Ok(DataBits::Six),
            7 => Ok(DataBits::Seven),
            8 => Ok(DataBits::Eight),
            other => Err(format!("{other} data bits are not supported")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopBits {
    One,
    Two,
}

impl TryFrom<u8> for StopBits {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(StopBits::One),
            2 => Ok(StopBits::Two),
            other => Err(format!("{other} stop bits are not supported")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parity {
    None,
    Odd,
    Even,
}

impl FromStr for Parity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "n" => Ok(Parity::None),
            "odd" | "o" => Ok(Parity::Odd),
            "even" | "e" => Ok(Parity::Even),
            other => Err(format!("unknown parity \"{other}\"")),
        }
    }
}

/// Line settings of the serial connection.
///
/// Receivers ship with different defaults, 9600 and 115200 baud are both
/// common, so nothing here is hard coded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SerialConfig {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
        }
    }
}

impl fmt::Display for SerialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data_bits = match self.data_bits {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        };
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        };
        let stop_bits = match self.stop_bits {
            StopBits::One => 1,
            StopBits::Two => 2,
        };
        write!(f, "{} {data_bits}{parity}{stop_bits}", self.baud_rate)
    }
}

/// Reasons why a serial device couldn't be opened.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum OpenError {
    #[error("no driver available for the device")]
    NoDriverAvailable,
    #[error("permission denied for device {0}")]
    PermissionDenied(DeviceId),
    #[error("device {0} is busy")]
    DeviceBusy(DeviceId),
    #[error("I/O error: {0}")]
    IoError(String),
}

/// Byte level access to an opened serial port.
pub trait SerialPortIo: Send {
    /// Reads into `buf` and waits at most `timeout` for data.
    ///
    /// A timeout returns `Ok(0)`.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Releases the port. Called exactly once per opened port.
    fn close(&mut self) -> io::Result<()>;
}

type PortSlot = Arc<Mutex<Option<Box<dyn SerialPortIo>>>>;

fn lock_port(port: &PortSlot) -> std::sync::MutexGuard<'_, Option<Box<dyn SerialPortIo>>> {
    port.lock().unwrap_or_else(|e| e.into_inner())
}

/// An open serial connection.
///
/// The connection is owned by the connection supervisor, which is the only
/// component that may close it. Other components only get a
/// [`ConnectionReader`].
pub struct Connection {
    device: DeviceDescriptor,
    port: PortSlot,
}

impl Connection {
    pub fn new(device: DeviceDescriptor, port: Box<dyn SerialPortIo>) -> Self {
        Connection {
            device,
            port: Arc::new(Mutex::new(Some(port))),
        }
    }

    pub fn device(&self) -> &DeviceDescriptor {
        &self.device
    }

    pub fn is_open(&self) -> bool {
        lock_port(&self.port).is_some()
    }

    /// Creates a read-only view of this connection.
    pub fn reader(&self) -> ConnectionReader {
        ConnectionReader {
            device: self.device.clone(),
            port: self.port.clone(),
        }
    }

    /// Reads up to `max_bytes`, see [`ConnectionReader::read`].
    pub fn read(&self, max_bytes: usize, timeout: Duration) -> io::Result<Vec<u8>> {
        read_port(&self.port, max_bytes, timeout)
    }

    /// Closes the port.
    ///
    /// Safe to call on an already closed connection, only the first call
    /// releases the port and returns `Ok(true)`. A read that is in flight is
    /// completed before the port is released, which is bounded by the read timeout.
    pub fn close(&self) -> io::Result<bool> {
        let Some(mut port) = lock_port(&self.port).take() else {
            debug!("Connection to {} already closed", self.device.id);
            return Ok(false);
        };
        port.close()?;
        debug!("Closed connection to {}", self.device.id);
        Ok(true)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("device", &self.device)
            .field("open", &self.is_open())
            .finish()
    }
}

/// A borrowed, read-only view of a [`Connection`].
///
/// The reader can't close the port. After the owner closed the connection every
/// read fails with [`ErrorKind::NotConnected`].
#[derive(Clone)]
pub struct ConnectionReader {
    device: DeviceDescriptor,
    port: PortSlot,
}

impl ConnectionReader {
    pub fn device(&self) -> &DeviceDescriptor {
        &self.device
    }

    /// Reads up to `max_bytes` and blocks at most `timeout`.
    ///
    /// An empty vector means no data arrived within the timeout, this is the
    /// normal idle state of a receiver and not an error.
    pub fn read(&self, max_bytes: usize, timeout: Duration) -> io::Result<Vec<u8>> {
        read_port(&self.port, max_bytes, timeout)
    }
}

impl fmt::Debug for ConnectionReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionReader")
            .field("device", &self.device)
            .finish()
    }
}

fn read_port(port: &PortSlot, max_bytes: usize, timeout: Duration) -> io::Result<Vec<u8>> {
    let mut guard = lock_port(port);
    let Some(port) = guard.as_mut() else {
        return Err(io::Error::from(ErrorKind::NotConnected));
    };
    let mut buf = vec![0; max_bytes];
    match port.read(&mut buf, timeout) {
        Ok(read) => {
            buf.truncate(read);
            Ok(buf)
        }
        Err(e) if e.kind() == ErrorKind::TimedOut => Ok(vec![]),
        Err(e) => Err(e),
    }
}

/// Access to the serial devices of the platform.
///
/// Implementations provide discovery, permission negotiation and opening. Reading
/// and closing operate on the returned [`Connection`].
pub trait SerialLink: Send + Sync {
    /// Lists the candidate devices in a stable order.
    fn discover(&self) -> Vec<DeviceDescriptor>;

    /// Whether access to `device` was already granted.
    fn has_permission(&self, device: &DeviceDescriptor) -> bool;

    /// Asks the platform for access to `device`.
    ///
    /// The grant or deny decision is delivered asynchronously through the
    /// returned channel. A dropped sender counts as denied.
    fn request_permission(&self, device: &DeviceDescriptor) -> oneshot::Receiver<bool>;

    /// Opens the port of `device` with the given line settings.
    fn open_port(
        &self,
        device: &DeviceDescriptor,
        config: &SerialConfig,
    ) -> Result<Box<dyn SerialPortIo>, OpenError>;

    /// Opens `device` and wraps the port into a [`Connection`].
    fn open(&self, device: &DeviceDescriptor, config: &SerialConfig) -> Result<Connection, OpenError> {
        let port = self.open_port(device, config)?;
        Ok(Connection::new(device.clone(), port))
    }

    fn read(&self, connection: &Connection, max_bytes: usize, timeout: Duration) -> io::Result<Vec<u8>> {
        connection.read(max_bytes, timeout)
    }

    /// Closes `connection`; closing `None` or a closed connection does nothing.
    fn close(&self, connection: Option<&Connection>) {
        let Some(connection) = connection else {
            return;
        };
        if let Err(e) = connection.close() {
            warn!("Error closing device {}: {}", connection.device().id, e);
        }
    }
}
