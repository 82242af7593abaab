// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use tracing::warn;

/// Default upper bound of a pending partial line in bytes.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 4096;

/// Reassembles newline terminated lines from arbitrarily chunked reads.
///
/// Serial reads return whatever bytes happen to be available, a sentence is
/// frequently split over two or more reads. The accumulator keeps the
/// unterminated tail until the terminating `\n` arrives, so the produced lines
/// are independent of the chunk boundaries.
///
/// A line longer than the bound is dropped as a whole, including the bytes
/// that arrive after the overflow up to its `\n`.
#[derive(Debug)]
pub struct LineAccumulator {
    pending: Vec<u8>,
    max_line_length: usize,
    discarding: bool,
}

impl Default for LineAccumulator {
    fn default() -> Self {
        LineAccumulator::new(DEFAULT_MAX_LINE_LENGTH)
    }
}

impl LineAccumulator {
    pub fn new(max_line_length: usize) -> Self {
        LineAccumulator {
            pending: Vec::new(),
            max_line_length,
            discarding: false,
        }
    }

    /// Appends `bytes` and returns every line completed by them.
    ///
    /// Lines are returned without the terminating `\n` and `\r`, empty lines are skipped.
    /// Invalid UTF-8 is replaced lossily.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for piece in bytes.split_inclusive(|b| *b == b'\n') {
            let terminated = piece.last() == Some(&b'\n');
            if self.discarding {
                self.discarding = !terminated;
                continue;
            }
            self.pending.extend_from_slice(piece);
            if terminated {
                if self.pending.len() - 1 > self.max_line_length {
                    warn!("Dropping serial line of {} bytes", self.pending.len() - 1);
                    self.pending.clear();
                    continue;
                }
                let line = String::from_utf8_lossy(&self.pending)
                    .trim_end_matches(['\r', '\n'])
                    .to_owned();
                self.pending.clear();
                if !line.is_empty() {
                    lines.push(line);
                }
            } else if self.pending.len() > self.max_line_length {
                warn!(
                    "Dropping {} bytes of unterminated serial data",
                    self.pending.len()
                );
                self.pending.clear();
                self.discarding = true;
            }
        }
        lines
    }

    /// Number of bytes waiting for their line terminator.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Discards the unterminated tail, e.g. after the connection changed.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.discarding = false;
    }
}
