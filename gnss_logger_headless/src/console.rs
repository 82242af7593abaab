// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use async_trait::async_trait;
use common::{device::ConnectionState, position::GnssFix};
use futures::StreamExt;
use module_core::{EventKind, Module, ModuleCtx};
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, error, info, warn};

/// A command typed on stdin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Status,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Option<Command> {
        match line.trim().to_ascii_lowercase().as_str() {
            "start" => Some(Command::Start),
            "stop" => Some(Command::Stop),
            "status" => Some(Command::Status),
            "quit" | "exit" => Some(Command::Quit),
            _ => None,
        }
    }
}

/// What the console knows about the running logger.
#[derive(Clone, Debug, Serialize)]
pub struct Status {
    pub logging: bool,
    pub connection: ConnectionState,
    pub latest_fix: Option<GnssFix>,
    pub saved_files: Vec<PathBuf>,
}

impl Default for Status {
    fn default() -> Self {
        Status {
            logging: false,
            connection: ConnectionState::Idle,
            latest_fix: None,
            saved_files: vec![],
        }
    }
}

impl Status {
    pub fn apply(&mut self, kind: &EventKind) {
        match kind {
            EventKind::LoggingToggleEvent(enabled) => self.logging = *enabled,
            EventKind::ConnectionStateEvent(state) => self.connection = state.clone(),
            EventKind::GnssFixEvent(fix) => self.latest_fix = Some(*fix),
            EventKind::LogPersistedEvent(report) => {
                self.saved_files = report.saved.iter().map(|(_, p)| p.clone()).collect();
            }
            _ => (),
        }
    }
}

/// Control surface of the headless logger.
///
/// Turns stdin commands into bus events and reports notices.
pub struct Console {
    ctx: ModuleCtx,
    autostart: bool,
    status: Status,
}

impl Console {
    pub fn new(ctx: ModuleCtx, autostart: bool) -> Self {
        Console {
            ctx,
            autostart,
            status: Status::default(),
        }
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::Start => {
                let _ = self.ctx.publish_event(EventKind::LoggingToggleEvent(true));
            }
            Command::Stop => {
                let _ = self.ctx.publish_event(EventKind::LoggingToggleEvent(false));
            }
            Command::Status => match serde_json::to_string_pretty(&self.status) {
                Ok(status) => println!("{status}"),
                Err(e) => error!("Failed to serialize status. Error: {}", e),
            },
            Command::Quit => {
                let _ = self.ctx.publish_event(EventKind::LoggingToggleEvent(false));
                let _ = self.ctx.publish_event(EventKind::QuitEvent);
            }
        }
    }
}

#[async_trait]
impl Module for Console {
    async fn run(&mut self) -> Result<(), ()> {
        if self.autostart {
            self.execute(Command::Start);
        }
        let mut lines = FramedRead::new(tokio::io::stdin(), LinesCodec::new());
        let mut stdin_open = true;
        let mut run = true;
        while run {
            tokio::select! {
                line = lines.next(), if stdin_open => {
                    match line {
                        Some(Ok(line)) => match Command::parse(&line) {
                            Some(command) => self.execute(command),
                            None if line.trim().is_empty() => (),
                            None => warn!("Unknown command \"{}\", use start, stop, status or quit", line.trim()),
                        },
                        Some(Err(e)) => error!("Failed to read command. Error: {}", e),
                        None => {
                            debug!("Stdin closed");
                            stdin_open = false;
                        }
                    }
                }
                event = self.ctx.receiver.recv() => {
                    match event {
                        Ok(event) => {
                            self.status.apply(&event.kind);
                            match event.kind {
                                EventKind::QuitEvent => run = false,
                                EventKind::NoticeEvent(notice) => info!("{}", notice),
                                _ => (),
                            }
                        }
                        Err(RecvError::Closed) => run = false,
                        Err(e) => debug!("Console missed events. Error: {}", e),
                    }
                }
            }
        }
        Ok(())
    }
}
