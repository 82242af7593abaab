// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use chrono::{DateTime, Utc};
use common::pose::PoseSample;
use serde::Deserialize;
use std::{
    io,
    path::Path,
    sync::atomic::{AtomicUsize, Ordering},
};
use thiserror::Error;
use tracing::debug;

/// Source of geospatial pose estimates, independent of the serial receiver.
///
/// Queried once per pose tick, implementations must return promptly.
pub trait PoseProvider: Send + Sync {
    fn current_pose(&self) -> Option<PoseSample>;
}

/// A provider that never has a pose.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPoseProvider;

impl PoseProvider for NoPoseProvider {
    fn current_pose(&self) -> Option<PoseSample> {
        None
    }
}

#[derive(Debug, Error)]
pub enum PoseReplayError {
    #[error("failed to read pose file: {0}")]
    Io(#[from] io::Error),
    #[error("invalid pose record: {0}")]
    Csv(#[from] csv::Error),
    #[error("pose file contains no poses")]
    Empty,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoseRecord {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    horizontal_accuracy: f64,
    #[serde(default)]
    altitude: f64,
    #[serde(default)]
    vertical_accuracy: f64,
    #[serde(default)]
    heading: f64,
    #[serde(default)]
    heading_accuracy: f64,
}

/// Replays recorded poses, one per query, starting over after the last one.
///
/// The timestamp of a replayed pose is the time of the query.
pub struct ReplayPoseProvider {
    poses: Vec<PoseSample>,
    next: AtomicUsize,
}

impl ReplayPoseProvider {
    pub fn new(poses: Vec<PoseSample>) -> Result<Self, PoseReplayError> {
        if poses.is_empty() {
            return Err(PoseReplayError::Empty);
        }
        Ok(ReplayPoseProvider {
            poses,
            next: AtomicUsize::new(0),
        })
    }

    /// Reads poses from a CSV file with a header row.
    ///
    /// `latitude` and `longitude` are required, the accuracy, altitude and
    /// heading columns are optional and default to zero.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, PoseReplayError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: io::Read>(reader: R) -> Result<Self, PoseReplayError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);
        let mut poses = vec![];
        for record in reader.deserialize() {
            let record: PoseRecord = record?;
            poses.push(PoseSample {
                latitude: record.latitude,
                longitude: record.longitude,
                horizontal_accuracy: record.horizontal_accuracy,
                altitude: record.altitude,
                vertical_accuracy: record.vertical_accuracy,
                heading: record.heading,
                heading_accuracy: record.heading_accuracy,
                timestamp: DateTime::<Utc>::UNIX_EPOCH,
            });
        }
        debug!("Loaded {} poses for replay", poses.len());
        Self::new(poses)
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }
}

impl PoseProvider for ReplayPoseProvider {
    fn current_pose(&self) -> Option<PoseSample> {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.poses.len();
        let mut pose = self.poses[index];
        pose.timestamp = Utc::now();
        Some(pose)
    }
}

/// Formats one row of the pose stream.
///
/// Without a pose the seven value columns stay empty and the row only carries
/// the tick time, so gaps remain visible in the log.
pub fn pose_row(pose: Option<&PoseSample>, tick: DateTime<Utc>) -> String {
    match pose {
        Some(pose) => {
            let values: Vec<String> = pose.values().iter().map(f64::to_string).collect();
            format!("{},{}", values.join(","), pose.timestamp.timestamp_millis())
        }
        None => format!(",,,,,,,{}", tick.timestamp_millis()),
    }
}
