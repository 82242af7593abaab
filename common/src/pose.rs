// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use crate::serde::millis;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single estimate of the platform geospatial pose provider.
///
/// The pose provider works independent of the serial GNSS receiver, both
/// streams are only correlated through their timestamps.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoseSample {
    pub latitude: f64,
    pub longitude: f64,
    pub horizontal_accuracy: f64,
    pub altitude: f64,
    pub vertical_accuracy: f64,
    pub heading: f64,
    pub heading_accuracy: f64,
    #[serde(with = "millis")]
    pub timestamp: DateTime<Utc>,
}

impl PoseSample {
    /// Creates a pose that only carries a horizontal position, every
    /// accuracy, altitude and heading value is zero.
    pub fn at(latitude: f64, longitude: f64, timestamp: DateTime<Utc>) -> Self {
        PoseSample {
            latitude,
            longitude,
            horizontal_accuracy: 0.0,
            altitude: 0.0,
            vertical_accuracy: 0.0,
            heading: 0.0,
            heading_accuracy: 0.0,
            timestamp,
        }
    }

    /// The seven measurement values in log column order.
    pub fn values(&self) -> [f64; 7] {
        [
            self.latitude,
            self.longitude,
            self.horizontal_accuracy,
            self.altitude,
            self.vertical_accuracy,
            self.heading,
            self.heading_accuracy,
        ]
    }
}
