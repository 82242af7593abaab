// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use common::record::StreamKind;
use std::sync::{Mutex, MutexGuard};

/// Header row of the persisted pose stream.
pub const POSE_HEADER: &str =
    "latitude,longitude,horizontalAccuracy,altitude,verticalAccuracy,heading,headingAccuracy,timestamp";

/// In-memory rows of both streams of a session.
///
/// Every stream has its own lock and a row is appended while holding it, so a
/// snapshot never contains a partial row. The two streams are independent, no
/// order between them is kept.
#[derive(Debug, Default)]
pub struct LogBuffer {
    raw: Mutex<String>,
    pose: Mutex<String>,
}

/// The contents of a [`LogBuffer`] at the time of the snapshot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LogSnapshot {
    /// One received sentence per line.
    pub raw: String,
    /// Pose rows, prefixed with [`POSE_HEADER`] if there is at least one row.
    pub pose: String,
}

impl LogSnapshot {
    pub fn stream(&self, kind: StreamKind) -> &str {
        match kind {
            StreamKind::RawNmea => &self.raw,
            StreamKind::Pose => &self.pose,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty() && self.pose.is_empty()
    }
}

fn lock(stream: &Mutex<String>) -> MutexGuard<'_, String> {
    stream.lock().unwrap_or_else(|e| e.into_inner())
}

fn push_row(stream: &Mutex<String>, row: &str) {
    let row = row.trim_end_matches(['\r', '\n']);
    let mut stream = lock(stream);
    stream.push_str(row);
    stream.push('\n');
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one raw sentence.
    ///
    /// Trailing line terminators of `line` are replaced by a single `\n`.
    pub fn append_raw(&self, line: &str) {
        push_row(&self.raw, line);
    }

    /// Appends one pose row.
    pub fn append_pose(&self, row: &str) {
        push_row(&self.pose, row);
    }

    pub fn raw_rows(&self) -> usize {
        lock(&self.raw).lines().count()
    }

    pub fn pose_rows(&self) -> usize {
        lock(&self.pose).lines().count()
    }

    /// Takes the contents of both streams and leaves the buffer empty.
    pub fn snapshot_and_clear(&self) -> LogSnapshot {
        let raw = std::mem::take(&mut *lock(&self.raw));
        let rows = std::mem::take(&mut *lock(&self.pose));
        let pose = if rows.is_empty() {
            rows
        } else {
            format!("{POSE_HEADER}\n{rows}")
        };
        LogSnapshot { raw, pose }
    }
}
