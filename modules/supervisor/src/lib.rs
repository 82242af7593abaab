// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! Connection supervisor
//!
//! Single owner of the serial connection and single source of truth for the
//! connection state. Hot-plug notifications, permission results, read failures
//! and the logging toggle all arrive as events on the bus and drive the state
//! machine `Idle -> Discovering -> AwaitingPermission -> Connected -> (Error) -> Idle`.

use async_trait::async_trait;
use common::{
    device::{ConnectionState, DeviceDescriptor},
    notice::Notice,
};
use module_core::{
    Event, EventKind, Module, ModuleCtx, PermissionResult, SerialReadError,
};
use serial_link::{Connection, ConnectionReader, SerialConfig, SerialLink};
use std::sync::Arc;
use tokio::sync::{broadcast::error::RecvError, watch};
use tracing::{debug, error, info, warn};

pub struct ConnectionSupervisor {
    ctx: ModuleCtx,
    link: Arc<dyn SerialLink>,
    config: SerialConfig,
    state: ConnectionState,
    logging_enabled: bool,
    last_attached: Option<DeviceDescriptor>,
    connection: Option<Connection>,
    reader: watch::Sender<Option<ConnectionReader>>,
}

impl ConnectionSupervisor {
    pub fn new(ctx: ModuleCtx, link: Arc<dyn SerialLink>, config: SerialConfig) -> Self {
        let (reader, _) = watch::channel(None);
        ConnectionSupervisor {
            ctx,
            link,
            config,
            state: ConnectionState::Idle,
            logging_enabled: false,
            last_attached: None,
            connection: None,
            reader,
        }
    }

    /// Read access to the current connection.
    ///
    /// Holds `Some` while the supervisor is connected. The sampler reads through
    /// this view but never closes the port.
    pub fn port_watch(&self) -> watch::Receiver<Option<ConnectionReader>> {
        self.reader.subscribe()
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        debug!("Connection state {:?} -> {:?}", self.state, state);
        self.state = state.clone();
        let _ = self
            .ctx
            .publish_event(EventKind::ConnectionStateEvent(state));
    }

    async fn on_logging_toggle(&mut self, enabled: bool) {
        self.logging_enabled = enabled;
        if enabled {
            self.connect().await;
        } else {
            self.disconnect().await;
            self.set_state(ConnectionState::Idle);
        }
    }

    async fn on_device_attached(&mut self, device: DeviceDescriptor) {
        info!("USB device attached: {}", device);
        self.last_attached = Some(device);
        if !self.logging_enabled {
            debug!("Logging disabled, not connecting to attached device");
            return;
        }
        self.connect().await;
    }

    async fn on_device_detached(&mut self, device: DeviceDescriptor) {
        if self.last_attached.as_ref() == Some(&device) {
            self.last_attached = None;
        }
        match &self.state {
            ConnectionState::Connected(current) if current.id == device.id => {
                info!("Connected device {} detached", device.id);
                self.disconnect().await;
                self.ctx.notify(Notice::DeviceDetached(device.id));
                self.set_state(ConnectionState::Idle);
            }
            ConnectionState::AwaitingPermission(current) if current.id == device.id => {
                info!("Device {} detached while awaiting permission", device.id);
                self.set_state(ConnectionState::Idle);
            }
            _ => debug!("Ignoring detach of device {}", device.id),
        }
    }

    async fn on_permission_result(&mut self, result: PermissionResult) {
        let awaited = match &self.state {
            ConnectionState::AwaitingPermission(device) if device.id == result.device.id => {
                device.clone()
            }
            _ => {
                debug!(
                    "Ignoring permission result for {} in state {:?}",
                    result.device.id, self.state
                );
                return;
            }
        };
        if result.granted {
            info!("Permission granted for device {}", awaited.id);
            self.open(awaited).await;
        } else {
            warn!("Permission denied for device {}", awaited.id);
            self.ctx.notify(Notice::PermissionDenied(awaited.id));
            self.set_state(ConnectionState::Idle);
        }
    }

    async fn on_read_error(&mut self, read_error: SerialReadError) {
        let connected_to_device = matches!(
            &self.state,
            ConnectionState::Connected(current) if current.id == read_error.device.id
        );
        if !connected_to_device {
            debug!("Ignoring read error of device {}", read_error.device.id);
            return;
        }
        error!(
            "Read from {} failed. Error: {}",
            read_error.device.id, read_error.message
        );
        self.disconnect().await;
        self.set_state(ConnectionState::Error(read_error.message.clone()));
        self.ctx.notify(Notice::ReadFailed(read_error.message));
        self.set_state(ConnectionState::Idle);
    }

    /// Tries to establish a connection.
    ///
    /// A no-op while connected or while a permission request is pending.
    async fn connect(&mut self) {
        match self.state {
            ConnectionState::Connected(_) => {
                debug!("Already connected, ignoring connect request");
                return;
            }
            ConnectionState::AwaitingPermission(_) => {
                debug!("Permission request pending, ignoring connect request");
                return;
            }
            _ => (),
        }
        self.set_state(ConnectionState::Discovering);

        let link = self.link.clone();
        let devices = match tokio::task::spawn_blocking(move || link.discover()).await {
            Ok(devices) => devices,
            Err(e) => {
                error!("Device discovery task failed. Error: {}", e);
                vec![]
            }
        };
        let candidate = self
            .last_attached
            .as_ref()
            .filter(|attached| devices.contains(attached))
            .or_else(|| devices.first())
            .cloned();
        let Some(device) = candidate else {
            info!("No USB devices found");
            self.ctx.notify(Notice::NoDeviceFound);
            self.set_state(ConnectionState::Idle);
            return;
        };

        if self.link.has_permission(&device) {
            self.open(device).await;
        } else {
            self.request_permission(device);
        }
    }

    fn request_permission(&mut self, device: DeviceDescriptor) {
        info!("Requesting permission for device {}", device.id);
        let answer = self.link.request_permission(&device);
        let sender = self.ctx.sender.clone();
        let requested = device.clone();
        tokio::spawn(async move {
            let granted = answer.await.unwrap_or(false);
            let _ = sender.send(Event {
                kind: EventKind::PermissionResultEvent(PermissionResult {
                    device: requested,
                    granted,
                }),
            });
        });
        self.set_state(ConnectionState::AwaitingPermission(device));
    }

    async fn open(&mut self, device: DeviceDescriptor) {
        let link = self.link.clone();
        let config = self.config;
        let target = device.clone();
        let opened = tokio::task::spawn_blocking(move || link.open(&target, &config))
            .await
            .unwrap_or_else(|e| Err(serial_link::OpenError::IoError(e.to_string())));
        match opened {
            Ok(connection) => {
                info!("Connected to {} with {}", device, self.config);
                self.reader.send_replace(Some(connection.reader()));
                self.connection = Some(connection);
                self.set_state(ConnectionState::Connected(device));
            }
            Err(e) => {
                error!("Failed to open device {}. Error: {}", device.id, e);
                self.set_state(ConnectionState::Error(e.to_string()));
                self.ctx.notify(Notice::OpenFailed(e.to_string()));
                self.set_state(ConnectionState::Idle);
            }
        }
    }

    async fn disconnect(&mut self) {
        self.reader.send_replace(None);
        let Some(connection) = self.connection.take() else {
            return;
        };
        let link = self.link.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || link.close(Some(&connection))).await {
            error!("Closing the connection failed. Error: {}", e);
        }
    }
}

#[async_trait]
impl Module for ConnectionSupervisor {
    async fn run(&mut self) -> Result<(), ()> {
        let mut run = true;
        while run {
            tokio::select! {
                event = self.ctx.receiver.recv() => {
                    match event {
                        Ok(event) => match event.kind {
                            EventKind::QuitEvent => {
                                debug!("ConnectionSupervisor received quit event");
                                self.disconnect().await;
                                run = false;
                            }
                            EventKind::LoggingToggleEvent(enabled) => {
                                self.on_logging_toggle(enabled).await;
                            }
                            EventKind::DeviceAttachedEvent(device) => {
                                self.on_device_attached(device).await;
                            }
                            EventKind::DeviceDetachedEvent(device) => {
                                self.on_device_detached(device).await;
                            }
                            EventKind::PermissionResultEvent(result) => {
                                self.on_permission_result(result).await;
                            }
                            EventKind::SerialReadErrorEvent(read_error) => {
                                self.on_read_error(read_error).await;
                            }
                            _ => (),
                        },
                        Err(RecvError::Closed) => run = false,
                        Err(e) => {
                            error!("Failed to receive event in ConnectionSupervisor. Error: {e}");
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
