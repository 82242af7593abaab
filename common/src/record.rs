// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use std::{fmt, path::PathBuf};

/// The two independent streams of a logging session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Raw NMEA sentences of the serial GNSS receiver.
    RawNmea,
    /// Rows of the geospatial pose provider.
    Pose,
}

impl StreamKind {
    /// Prefix of the persisted file name of the stream.
    pub fn file_prefix(&self) -> &'static str {
        match self {
            StreamKind::RawNmea => "USB",
            StreamKind::Pose => "DEVICE",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_prefix())
    }
}

/// Outcome of flushing a session to storage.
///
/// Streams without any rows appear in neither list.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PersistReport {
    pub saved: Vec<(StreamKind, PathBuf)>,
    pub failed: Vec<(StreamKind, String)>,
}

impl PersistReport {
    pub fn is_empty(&self) -> bool {
        self.saved.is_empty() && self.failed.is_empty()
    }

    pub fn saved_path(&self, kind: StreamKind) -> Option<&PathBuf> {
        self.saved.iter().find(|(k, _)| *k == kind).map(|(_, p)| p)
    }
}
