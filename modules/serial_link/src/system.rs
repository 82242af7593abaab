// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! [`SerialLink`] backed by the serial ports of the operating system.

use crate::{DataBits, OpenError, Parity, SerialConfig, SerialLink, SerialPortIo, StopBits};
use common::device::{DeviceDescriptor, DeviceId};
use serialport::{SerialPort, SerialPortType};
use std::{
    collections::HashSet,
    io::{self, ErrorKind, Read},
    path::Path,
    sync::Mutex,
    time::Duration,
};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Decides which devices may be opened.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum PermissionPolicy {
    /// Every discovered device with a writable device node.
    #[default]
    GrantAll,
    /// Only the listed port names.
    AllowList(Vec<String>),
}

impl PermissionPolicy {
    fn allows(&self, device: &DeviceDescriptor) -> bool {
        match self {
            PermissionPolicy::GrantAll => true,
            PermissionPolicy::AllowList(names) => names.iter().any(|n| n == device.id.as_str()),
        }
    }
}

/// Serial ports of the operating system.
///
/// Discovery reports USB serial adapters together with their vendor and
/// product id. Ports that are not enumerated as USB devices (e.g. a pty of a
/// receiver simulator) can be added with [`SystemSerialLink::with_extra_ports`].
/// Granted permissions are remembered for the lifetime of the link.
pub struct SystemSerialLink {
    policy: PermissionPolicy,
    extra_ports: Vec<String>,
    granted: Mutex<HashSet<DeviceId>>,
}

impl SystemSerialLink {
    pub fn new(policy: PermissionPolicy) -> Self {
        SystemSerialLink {
            policy,
            extra_ports: vec![],
            granted: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_extra_ports(mut self, ports: Vec<String>) -> Self {
        self.extra_ports = ports;
        self
    }

    fn granted(&self) -> std::sync::MutexGuard<'_, HashSet<DeviceId>> {
        self.granted.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Whether this process may open the device node for writing.
fn is_writable(port_name: &str) -> bool {
    match std::fs::OpenOptions::new().write(true).open(port_name) {
        Ok(_) => true,
        Err(e) => {
            debug!("Can't open {} for writing: {}", port_name, e);
            false
        }
    }
}

impl SerialLink for SystemSerialLink {
    fn discover(&self) -> Vec<DeviceDescriptor> {
        let mut devices = match serialport::available_ports() {
            Ok(ports) => ports
                .into_iter()
                .filter_map(|port| match port.port_type {
                    SerialPortType::UsbPort(usb) => Some(DeviceDescriptor {
                        id: DeviceId(port.port_name),
                        vendor_id: usb.vid,
                        product_id: usb.pid,
                        product: usb.product,
                    }),
                    _ => None,
                })
                .collect(),
            Err(e) => {
                error!("Failed to enumerate serial ports. Error: {}", e);
                vec![]
            }
        };
        devices.extend(
            self.extra_ports
                .iter()
                .filter(|name| Path::new(name).exists())
                .map(|name| DeviceDescriptor::new(name, 0, 0)),
        );
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        devices.dedup_by(|a, b| a.id == b.id);
        devices
    }

    fn has_permission(&self, device: &DeviceDescriptor) -> bool {
        self.granted().contains(&device.id)
    }

    fn request_permission(&self, device: &DeviceDescriptor) -> oneshot::Receiver<bool> {
        let (sender, receiver) = oneshot::channel();
        let granted = self.policy.allows(device) && is_writable(device.id.as_str());
        if granted {
            self.granted().insert(device.id.clone());
            info!("USB permission granted for device {}", device.id);
        } else {
            warn!("USB permission denied for device {}", device.id);
        }
        let _ = sender.send(granted);
        receiver
    }

    fn open_port(
        &self,
        device: &DeviceDescriptor,
        config: &SerialConfig,
    ) -> Result<Box<dyn SerialPortIo>, OpenError> {
        let devices = self.discover();
        if !devices.iter().any(|d| d.id == device.id) {
            return Err(OpenError::NoDriverAvailable);
        }
        if !self.has_permission(device) {
            return Err(OpenError::PermissionDenied(device.id.clone()));
        }
        let port = serialport::new(device.id.as_str(), config.baud_rate)
            .data_bits(match config.data_bits {
                DataBits::Five => serialport::DataBits::Five,
                DataBits::Six => serialport::DataBits::Six,
                DataBits::Seven => serialport::DataBits::Seven,
                DataBits::Eight => serialport::DataBits::Eight,
            })
            .stop_bits(match config.stop_bits {
                StopBits::One => serialport::StopBits::One,
                StopBits::Two => serialport::StopBits::Two,
            })
            .parity(match config.parity {
                Parity::None => serialport::Parity::None,
                Parity::Odd => serialport::Parity::Odd,
                Parity::Even => serialport::Parity::Even,
            })
            .timeout(Duration::from_millis(1000))
            .open()
            .map_err(|e| map_open_error(device, e))?;
        info!("Opened {} with {}", device.id, config);
        Ok(Box::new(SystemPort { port }))
    }
}

fn map_open_error(device: &DeviceDescriptor, e: serialport::Error) -> OpenError {
    match e.kind() {
        serialport::ErrorKind::NoDevice => OpenError::NoDriverAvailable,
        serialport::ErrorKind::Io(ErrorKind::PermissionDenied) => {
            OpenError::PermissionDenied(device.id.clone())
        }
        serialport::ErrorKind::Io(ErrorKind::ResourceBusy) => {
            OpenError::DeviceBusy(device.id.clone())
        }
        _ => OpenError::IoError(e.to_string()),
    }
}

struct SystemPort {
    port: Box<dyn SerialPort>,
}

impl SerialPortIo for SystemPort {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        if self.port.timeout() != timeout {
            self.port.set_timeout(timeout).map_err(io::Error::from)?;
        }
        match self.port.read(buf) {
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            result => result,
        }
    }

    fn close(&mut self) -> io::Result<()> {
        // The descriptor is released when the port is dropped, pending output is discarded.
        self.port.clear(serialport::ClearBuffer::All).map_err(io::Error::from)
    }
}
