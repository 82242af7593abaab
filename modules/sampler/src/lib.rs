// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! Sampler of the GNSS logger
//!
//! Runs the two periodic loops of a logging session:
//! - the serial loop reads the receiver, splits the byte stream into sentences,
//!   decodes fixes and appends to the raw stream,
//! - the pose loop samples the pose provider once per period and appends to the
//!   pose stream.
//!
//! Both loops are cancelled and joined by [`Sampler::stop`] before the session
//! buffer is flushed.

use chrono::Utc;
use common::position::GnssFix;
use module_core::{Event, EventKind, SerialReadError};
use nmea::{LineAccumulator, NmeaCodec, ParseError};
use serial_link::ConnectionReader;
use std::{io::ErrorKind, sync::Arc, time::Duration};
use storage::LogBuffer;
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub mod pose;

pub use pose::{NoPoseProvider, PoseProvider, PoseReplayError, ReplayPoseProvider, pose_row};

/// Which received lines end up in the raw stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RawCapture {
    /// Every complete line as received.
    #[default]
    AllSentences,
    /// Only lines that decoded into a fix.
    FixSentencesOnly,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SamplerConfig {
    /// Upper bound of a single serial read.
    pub read_timeout: Duration,
    /// Pause after a read without data.
    pub idle_poll: Duration,
    pub pose_period: Duration,
    pub max_read_bytes: usize,
    pub raw_capture: RawCapture,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        SamplerConfig {
            read_timeout: Duration::from_millis(1000),
            idle_poll: Duration::from_millis(100),
            pose_period: Duration::from_millis(1000),
            max_read_bytes: 4096,
            raw_capture: RawCapture::AllSentences,
        }
    }
}

struct RunningLoops {
    cancel: CancellationToken,
    serial: JoinHandle<()>,
    pose: JoinHandle<()>,
}

pub struct Sampler {
    sender: broadcast::Sender<Event>,
    port: watch::Receiver<Option<ConnectionReader>>,
    codec: NmeaCodec,
    pose_provider: Arc<dyn PoseProvider>,
    config: SamplerConfig,
    latest_fix: watch::Sender<Option<GnssFix>>,
    loops: Option<RunningLoops>,
}

impl Sampler {
    /// Creates a stopped sampler.
    ///
    /// `port` is the read access lent by the connection supervisor; `sender`
    /// receives `GnssFixEvent`s and `SerialReadErrorEvent`s.
    pub fn new(
        sender: broadcast::Sender<Event>,
        port: watch::Receiver<Option<ConnectionReader>>,
        codec: NmeaCodec,
        pose_provider: Arc<dyn PoseProvider>,
        config: SamplerConfig,
    ) -> Self {
        let (latest_fix, _) = watch::channel(None);
        Sampler {
            sender,
            port,
            codec,
            pose_provider,
            config,
            latest_fix,
            loops: None,
        }
    }

    /// The most recent fix of the serial loop.
    pub fn latest_fix(&self) -> watch::Receiver<Option<GnssFix>> {
        self.latest_fix.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.loops.is_some()
    }

    /// Starts both loops writing into `buffer`.
    ///
    /// Returns `false` if the loops are already running.
    pub fn start(&mut self, buffer: Arc<LogBuffer>) -> bool {
        if self.loops.is_some() {
            warn!("Sampler already running");
            return false;
        }
        let cancel = CancellationToken::new();
        let serial = SerialLoop {
            cancel: cancel.clone(),
            port: self.port.clone(),
            codec: self.codec.clone(),
            buffer: buffer.clone(),
            config: self.config,
            sender: self.sender.clone(),
            latest_fix: self.latest_fix.clone(),
            accumulator: LineAccumulator::default(),
        };
        let pose = PoseLoop {
            cancel: cancel.clone(),
            provider: self.pose_provider.clone(),
            buffer,
            period: self.config.pose_period,
        };
        self.loops = Some(RunningLoops {
            cancel,
            serial: tokio::spawn(serial.run()),
            pose: tokio::spawn(pose.run()),
        });
        info!("Sampler started");
        true
    }

    /// Cancels both loops and waits until they have finished.
    ///
    /// After this returns no further rows are appended to the buffer passed
    /// to [`Sampler::start`]. Returns `false` if the sampler wasn't running.
    pub async fn stop(&mut self) -> bool {
        let Some(loops) = self.loops.take() else {
            return false;
        };
        loops.cancel.cancel();
        if let Err(e) = loops.serial.await {
            error!("Serial loop failed. Error: {}", e);
        }
        if let Err(e) = loops.pose.await {
            error!("Pose loop failed. Error: {}", e);
        }
        info!("Sampler stopped");
        true
    }
}

struct SerialLoop {
    cancel: CancellationToken,
    port: watch::Receiver<Option<ConnectionReader>>,
    codec: NmeaCodec,
    buffer: Arc<LogBuffer>,
    config: SamplerConfig,
    sender: broadcast::Sender<Event>,
    latest_fix: watch::Sender<Option<GnssFix>>,
    accumulator: LineAccumulator,
}

impl SerialLoop {
    async fn run(mut self) {
        debug!("Serial loop started");
        while !self.cancel.is_cancelled() {
            let reader = self.port.borrow_and_update().clone();
            let Some(reader) = reader else {
                self.accumulator.reset();
                self.wait_for_port_change().await;
                continue;
            };

            let max_bytes = self.config.max_read_bytes;
            let timeout = self.config.read_timeout;
            let read_from = reader.clone();
            let read = tokio::task::spawn_blocking(move || read_from.read(max_bytes, timeout));
            let result = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = read => result,
            };

            match result {
                Ok(Ok(bytes)) if bytes.is_empty() => {
                    tokio::select! {
                        _ = self.cancel.cancelled() => (),
                        _ = tokio::time::sleep(self.config.idle_poll) => (),
                    }
                }
                Ok(Ok(bytes)) => {
                    for line in self.accumulator.push(&bytes) {
                        self.on_line(&line);
                    }
                }
                Ok(Err(e)) if e.kind() == ErrorKind::NotConnected => {
                    debug!("Connection to {} closed", reader.device().id);
                    self.accumulator.reset();
                    self.wait_for_port_change().await;
                }
                Ok(Err(e)) => {
                    warn!("Read from {} failed. Error: {}", reader.device().id, e);
                    self.accumulator.reset();
                    let _ = self.sender.send(Event {
                        kind: EventKind::SerialReadErrorEvent(SerialReadError {
                            device: reader.device().clone(),
                            message: e.to_string(),
                        }),
                    });
                    self.wait_for_port_change().await;
                }
                Err(e) => {
                    error!("Serial read task failed. Error: {}", e);
                    break;
                }
            }
        }
        debug!("Serial loop stopped");
    }

    async fn wait_for_port_change(&mut self) {
        tokio::select! {
            _ = self.cancel.cancelled() => (),
            changed = self.port.changed() => {
                if changed.is_err() {
                    // The supervisor is gone, no connection will show up again.
                    self.cancel.cancelled().await;
                }
            }
        }
    }

    fn on_line(&mut self, line: &str) {
        match self.codec.parse_fix(line) {
            Ok(fix) => {
                debug!("Fix {:.6}, {:.6}", fix.latitude(), fix.longitude());
                self.buffer.append_raw(line);
                self.latest_fix.send_replace(Some(fix));
                let _ = self.sender.send(Event {
                    kind: EventKind::GnssFixEvent(fix),
                });
            }
            Err(e) => {
                if !matches!(e, ParseError::UnsupportedSentence(_)) {
                    debug!("Skipping sentence \"{}\". Error: {}", line, e);
                }
                if self.config.raw_capture == RawCapture::AllSentences {
                    self.buffer.append_raw(line);
                }
            }
        }
    }
}

struct PoseLoop {
    cancel: CancellationToken,
    provider: Arc<dyn PoseProvider>,
    buffer: Arc<LogBuffer>,
    period: Duration,
}

impl PoseLoop {
    async fn run(self) {
        debug!("Pose loop started");
        let mut timer = tokio::time::interval(self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = timer.tick() => {
                    let pose = self.provider.current_pose();
                    self.buffer.append_pose(&pose_row(pose.as_ref(), Utc::now()));
                }
            }
        }
        debug!("Pose loop stopped");
    }
}
