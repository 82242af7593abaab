// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! Common Modul for the GNSS logger
//!
//! Provides the common data types that are exchanged between the modules:
//! receiver fixes, geospatial pose samples, serial device descriptors and
//! the user facing notices.

pub mod device;
pub mod notice;
pub mod pose;
pub mod position;
pub mod record;
pub mod serde;
