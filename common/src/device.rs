// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a serial device by its port name, e.g. `/dev/ttyUSB0`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn new(port_name: &str) -> Self {
        DeviceId(port_name.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A serial device candidate as reported by the device discovery.
///
/// Virtual ports that are not backed by USB report `0` for vendor and product id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub id: DeviceId,
    pub vendor_id: u16,
    pub product_id: u16,
    pub product: Option<String>,
}

impl DeviceDescriptor {
    pub fn new(port_name: &str, vendor_id: u16, product_id: u16) -> Self {
        DeviceDescriptor {
            id: DeviceId::new(port_name),
            vendor_id,
            product_id,
            product: None,
        }
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Device: {}, Vendor ID: {:04x}, Product ID: {:04x}",
            self.id, self.vendor_id, self.product_id
        )?;
        if let Some(product) = &self.product {
            write!(f, " ({product})")?;
        }
        Ok(())
    }
}

/// The states of the serial connection lifecycle.
///
/// `Error` is transient: the supervisor reports it and falls back to `Idle`
/// right after the connection is closed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ConnectionState {
    Idle,
    Discovering,
    AwaitingPermission(DeviceDescriptor),
    Connected(DeviceDescriptor),
    Error(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected(_))
    }
}
