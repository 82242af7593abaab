// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! Storage of the GNSS logger
//!
//! Collects the rows of a running session in memory ([`LogBuffer`]) and persists
//! them as plain text files when the session ends ([`LogWriter`]).

pub mod buffer;
pub mod writer;

pub use buffer::{LogBuffer, LogSnapshot, POSE_HEADER};
pub use writer::LogWriter;
