// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use async_trait::async_trait;
use chrono::{DateTime, Local};
use common::notice::Notice;
use module_core::{EventKind, Module, ModuleCtx, PersistReportPtr};
use sampler::Sampler;
use std::sync::Arc;
use storage::{LogBuffer, LogWriter};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info};

/// State of one logging session, created on start and dropped after the flush.
pub struct SessionContext {
    buffer: Arc<LogBuffer>,
    started_at: DateTime<Local>,
}

impl SessionContext {
    pub fn new() -> Self {
        SessionContext {
            buffer: Arc::new(LogBuffer::new()),
            started_at: Local::now(),
        }
    }

    pub fn buffer(&self) -> &Arc<LogBuffer> {
        &self.buffer
    }

    pub fn started_at(&self) -> &DateTime<Local> {
        &self.started_at
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Starts and stops logging sessions on `LoggingToggleEvent`s.
///
/// Stopping cancels and joins the sampler loops before the buffer is taken, so
/// the flushed files only contain complete rows. A session that is still
/// active on `QuitEvent` is flushed as well.
pub struct LoggingSession {
    ctx: ModuleCtx,
    sampler: Sampler,
    writer: LogWriter,
    session: Option<SessionContext>,
}

impl LoggingSession {
    pub fn new(ctx: ModuleCtx, sampler: Sampler, writer: LogWriter) -> Self {
        LoggingSession {
            ctx,
            sampler,
            writer,
            session: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    fn start_session(&mut self) {
        if self.session.is_some() {
            debug!("Logging session already active");
            return;
        }
        let session = SessionContext::new();
        self.sampler.start(session.buffer().clone());
        info!("Logging session started at {}", session.started_at());
        self.session = Some(session);
        self.ctx.notify(Notice::LoggingStarted);
    }

    async fn stop_session(&mut self) {
        let Some(session) = self.session.take() else {
            debug!("No active logging session");
            return;
        };
        self.sampler.stop().await;
        let snapshot = session.buffer().snapshot_and_clear();
        let report = self.writer.persist(&snapshot, &Local::now()).await;
        for (_, path) in &report.saved {
            self.ctx.notify(Notice::LogSaved(path.clone()));
        }
        for (kind, reason) in &report.failed {
            self.ctx.notify(Notice::LogSaveFailed(format!("{kind}: {reason}")));
        }
        info!(
            "Logging session of {} stopped, {} file(s) saved",
            session.started_at(),
            report.saved.len()
        );
        let _ = self
            .ctx
            .publish_event(EventKind::LogPersistedEvent(PersistReportPtr::new(report)));
        self.ctx.notify(Notice::LoggingStopped);
    }
}

#[async_trait]
impl Module for LoggingSession {
    async fn run(&mut self) -> Result<(), ()> {
        let mut run = true;
        while run {
            tokio::select! {
                event = self.ctx.receiver.recv() => {
                    match event {
                        Ok(event) => match event.kind {
                            EventKind::QuitEvent => {
                                self.stop_session().await;
                                run = false;
                            }
                            EventKind::LoggingToggleEvent(true) => self.start_session(),
                            EventKind::LoggingToggleEvent(false) => self.stop_session().await,
                            _ => (),
                        },
                        Err(RecvError::Closed) => {
                            self.stop_session().await;
                            run = false;
                        }
                        Err(e) => {
                            error!("Failed to receive event in module LoggingSession. Error:{e}");
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
