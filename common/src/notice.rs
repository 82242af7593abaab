// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use crate::device::DeviceId;
use std::{fmt, path::PathBuf};

/// User visible notifications emitted by the modules.
///
/// The headless binary only logs them, a graphical frontend would show them
/// as short lived messages.
#[derive(Clone, Debug, PartialEq)]
pub enum Notice {
    LoggingStarted,
    LoggingStopped,
    NoDeviceFound,
    PermissionDenied(DeviceId),
    OpenFailed(String),
    ReadFailed(String),
    DeviceDetached(DeviceId),
    LogSaved(PathBuf),
    LogSaveFailed(String),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::LoggingStarted => write!(f, "Logging Start"),
            Notice::LoggingStopped => write!(f, "Logging Stop"),
            Notice::NoDeviceFound => write!(f, "No USB devices found"),
            Notice::PermissionDenied(id) => write!(f, "USB permission denied for device {id}"),
            Notice::OpenFailed(e) => write!(f, "Error opening device: {e}"),
            Notice::ReadFailed(e) => write!(f, "Error reading USB data: {e}"),
            Notice::DeviceDetached(id) => write!(f, "USB device detached: {id}"),
            Notice::LogSaved(path) => write!(f, "{} saved", path.to_string_lossy()),
            Notice::LogSaveFailed(e) => write!(f, "Failed to save data: {e}"),
        }
    }
}
