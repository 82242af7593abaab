// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use crate::SerialLink;
use common::device::DeviceDescriptor;
use module_core::{EventKind, Module, ModuleCtx};
use std::{sync::Arc, time::Duration};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info};

/// Turns the device discovery into hot-plug notifications.
///
/// The platform offers no attach or detach callbacks on every system, so the
/// watcher compares consecutive discovery scans and publishes a
/// `DeviceAttachedEvent` or `DeviceDetachedEvent` for every difference.
/// Devices present at start are reported as attached.
pub struct HotplugWatcher {
    ctx: ModuleCtx,
    link: Arc<dyn SerialLink>,
    period: Duration,
    known: Vec<DeviceDescriptor>,
}

impl HotplugWatcher {
    pub fn new(ctx: ModuleCtx, link: Arc<dyn SerialLink>, period: Duration) -> Self {
        HotplugWatcher {
            ctx,
            link,
            period,
            known: vec![],
        }
    }

    async fn scan(&mut self) {
        let link = self.link.clone();
        let devices = match tokio::task::spawn_blocking(move || link.discover()).await {
            Ok(devices) => devices,
            Err(e) => {
                error!("Device discovery task failed. Error: {}", e);
                return;
            }
        };
        for detached in self.known.iter().filter(|d| !devices.contains(d)) {
            info!("USB device detached: {}", detached);
            let _ = self
                .ctx
                .publish_event(EventKind::DeviceDetachedEvent(detached.clone()));
        }
        for attached in devices.iter().filter(|d| !self.known.contains(d)) {
            info!("USB device attached: {}", attached);
            let _ = self
                .ctx
                .publish_event(EventKind::DeviceAttachedEvent(attached.clone()));
        }
        self.known = devices;
    }
}

#[async_trait::async_trait]
impl Module for HotplugWatcher {
    async fn run(&mut self) -> Result<(), ()> {
        let mut timer = tokio::time::interval(self.period);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut run = true;
        while run {
            tokio::select! {
                _ = timer.tick() => {
                    self.scan().await;
                }
                event = self.ctx.receiver.recv() => {
                    match event {
                        Ok(event) => {
                            if let EventKind::QuitEvent = event.kind {
                                debug!("HotplugWatcher received quit event");
                                run = false;
                            }
                        }
                        Err(RecvError::Closed) => run = false,
                        Err(e) => error!("Failed to receive event in HotplugWatcher. Error: {}", e),
                    }
                }
            }
        }
        Ok(())
    }
}
