// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! In-memory serial devices for tests.

use crate::{OpenError, SerialConfig, SerialLink, SerialPortIo};
use common::device::{DeviceDescriptor, DeviceId};
use std::{
    collections::{HashMap, HashSet, VecDeque},
    io::{self, ErrorKind},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use tokio::sync::oneshot;

#[derive(Default)]
struct VirtualPortState {
    chunks: VecDeque<Vec<u8>>,
    fail_next_read: bool,
}

#[derive(Default)]
struct VirtualState {
    devices: Vec<DeviceDescriptor>,
    granted: HashSet<DeviceId>,
    pending: Vec<(DeviceId, oneshot::Sender<bool>)>,
    auto_answer: Option<bool>,
    ports: HashMap<DeviceId, Arc<Mutex<VirtualPortState>>>,
    open_error: Option<OpenError>,
    last_config: Option<SerialConfig>,
    open_count: usize,
    close_count: usize,
}

/// A [`SerialLink`] whose devices, permissions and received bytes are scripted by the test.
///
/// Clones share the same state, so a test can keep a handle while the module
/// under test owns another one.
#[derive(Clone, Default)]
pub struct VirtualSerialLink {
    state: Arc<Mutex<VirtualState>>,
}

impl VirtualSerialLink {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, VirtualState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Makes `device` discoverable.
    pub fn attach(&self, device: &DeviceDescriptor) {
        let mut state = self.state();
        if !state.devices.contains(device) {
            state.devices.push(device.clone());
        }
        state.ports.entry(device.id.clone()).or_default();
    }

    /// Removes `device` from the discovery and drops its unread data.
    pub fn detach(&self, device: &DeviceDescriptor) {
        let mut state = self.state();
        state.devices.retain(|d| d.id != device.id);
        state.ports.remove(&device.id);
    }

    /// Grants access to `device` without a permission request.
    pub fn grant(&self, device: &DeviceDescriptor) {
        self.state().granted.insert(device.id.clone());
    }

    /// Answers every future permission request immediately.
    pub fn answer_permission_requests(&self, granted: bool) {
        self.state().auto_answer = Some(granted);
    }

    /// Answers the pending permission request of `device`.
    ///
    /// Returns `false` if no request is pending.
    pub fn resolve_permission(&self, device: &DeviceDescriptor, granted: bool) -> bool {
        let mut state = self.state();
        let Some(index) = state.pending.iter().position(|(id, _)| *id == device.id) else {
            return false;
        };
        let (id, sender) = state.pending.remove(index);
        if granted {
            state.granted.insert(id);
        }
        let _ = sender.send(granted);
        true
    }

    pub fn pending_permission_requests(&self) -> usize {
        self.state().pending.len()
    }

    /// Makes every following open fail with `error`.
    pub fn fail_open(&self, error: Option<OpenError>) {
        self.state().open_error = error;
    }

    /// Queues `bytes` as the result of one read on the port of `device`.
    pub fn feed(&self, device: &DeviceDescriptor, bytes: &[u8]) {
        let port = self.state().ports.entry(device.id.clone()).or_default().clone();
        port.lock()
            .unwrap_or_else(|e| e.into_inner())
            .chunks
            .push_back(bytes.to_vec());
    }

    /// Lets the next read on the port of `device` fail with an I/O error.
    pub fn fail_next_read(&self, device: &DeviceDescriptor) {
        let port = self.state().ports.entry(device.id.clone()).or_default().clone();
        port.lock().unwrap_or_else(|e| e.into_inner()).fail_next_read = true;
    }

    pub fn open_count(&self) -> usize {
        self.state().open_count
    }

    pub fn close_count(&self) -> usize {
        self.state().close_count
    }

    pub fn last_config(&self) -> Option<SerialConfig> {
        self.state().last_config
    }
}

impl SerialLink for VirtualSerialLink {
    fn discover(&self) -> Vec<DeviceDescriptor> {
        self.state().devices.clone()
    }

    fn has_permission(&self, device: &DeviceDescriptor) -> bool {
        self.state().granted.contains(&device.id)
    }

    fn request_permission(&self, device: &DeviceDescriptor) -> oneshot::Receiver<bool> {
        let (sender, receiver) = oneshot::channel();
        let mut state = self.state();
        match state.auto_answer {
            Some(granted) => {
                if granted {
                    state.granted.insert(device.id.clone());
                }
                let _ = sender.send(granted);
            }
            None => state.pending.push((device.id.clone(), sender)),
        }
        receiver
    }

    fn open_port(
        &self,
        device: &DeviceDescriptor,
        config: &SerialConfig,
    ) -> Result<Box<dyn SerialPortIo>, OpenError> {
        let mut state = self.state();
        if let Some(error) = &state.open_error {
            return Err(error.clone());
        }
        if !state.devices.iter().any(|d| d.id == device.id) {
            return Err(OpenError::NoDriverAvailable);
        }
        if !state.granted.contains(&device.id) {
            return Err(OpenError::PermissionDenied(device.id.clone()));
        }
        state.open_count += 1;
        state.last_config = Some(*config);
        let port = state.ports.entry(device.id.clone()).or_default().clone();
        Ok(Box::new(VirtualPort {
            port,
            link: self.state.clone(),
        }))
    }
}

struct VirtualPort {
    port: Arc<Mutex<VirtualPortState>>,
    link: Arc<Mutex<VirtualState>>,
}

impl SerialPortIo for VirtualPort {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        {
            let mut port = self.port.lock().unwrap_or_else(|e| e.into_inner());
            if port.fail_next_read {
                port.fail_next_read = false;
                return Err(io::Error::new(ErrorKind::BrokenPipe, "virtual device failure"));
            }
            if let Some(mut chunk) = port.chunks.pop_front() {
                let read = chunk.len().min(buf.len());
                buf[..read].copy_from_slice(&chunk[..read]);
                if read < chunk.len() {
                    port.chunks.push_front(chunk.split_off(read));
                }
                return Ok(read);
            }
        }
        std::thread::sleep(timeout.min(Duration::from_millis(5)));
        Ok(0)
    }

    fn close(&mut self) -> io::Result<()> {
        self.link.lock().unwrap_or_else(|e| e.into_inner()).close_count += 1;
        Ok(())
    }
}
