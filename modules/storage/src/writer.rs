// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use crate::LogSnapshot;
use chrono::{DateTime, Local};
use common::record::{PersistReport, StreamKind};
use std::{
    io,
    path::{Path, PathBuf},
};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

/// Writes the streams of a finished session into an output directory.
///
/// Each non-empty stream becomes its own file named
/// `{USB|DEVICE}_{yyyyMMdd_HHmmss}.txt`. Existing files are never overwritten,
/// a numeric suffix is appended instead.
pub struct LogWriter {
    output_dir: PathBuf,
}

impl LogWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        LogWriter {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// File name of `kind` for a session saved at `at`, without collision suffix.
    pub fn file_name(kind: StreamKind, at: &DateTime<Local>) -> String {
        format!("{}_{}.txt", kind.file_prefix(), at.format("%Y%m%d_%H%M%S"))
    }

    /// Persists every non-empty stream of `snapshot`.
    ///
    /// A failed stream is reported and its data is dropped, the other stream is
    /// written nevertheless.
    pub async fn persist(&self, snapshot: &LogSnapshot, at: &DateTime<Local>) -> PersistReport {
        let mut report = PersistReport::default();
        for kind in [StreamKind::RawNmea, StreamKind::Pose] {
            let contents = snapshot.stream(kind);
            if contents.is_empty() {
                debug!("Stream {} is empty, nothing to save", kind);
                continue;
            }
            match self.write_stream(kind, contents, at).await {
                Ok(path) => {
                    info!("Saved {} log to {}", kind, path.to_string_lossy());
                    report.saved.push((kind, path));
                }
                Err(e) => {
                    error!("Failed to save {} log. Error: {}", kind, e);
                    report.failed.push((kind, e.to_string()));
                }
            }
        }
        report
    }

    async fn write_stream(
        &self,
        kind: StreamKind,
        contents: &str,
        at: &DateTime<Local>,
    ) -> io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let name = LogWriter::file_name(kind, at);
        let stem = name.trim_end_matches(".txt");
        let mut suffix = 0;
        loop {
            let path = if suffix == 0 {
                self.output_dir.join(&name)
            } else {
                self.output_dir.join(format!("{stem}_{suffix}.txt"))
            };
            match self.save_bytes(&path, contents.as_bytes()).await {
                Ok(()) => return Ok(path),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!("{} already exists", path.to_string_lossy());
                    suffix += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Writes `data` into a new file at `path` and syncs it to disk.
    ///
    /// Fails with `AlreadyExists` instead of truncating an existing file.
    async fn save_bytes(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        Ok(())
    }
}
