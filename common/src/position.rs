// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use crate::serde::millis;
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// A resolved latitude/longitude reading of the external GNSS receiver.
///
/// A fix is only ever created from a completely parsed sentence, both
/// coordinates are always present.
///
/// # Fields
///
/// - `latitude` – Decimal degrees, positive north of the equator.
/// - `longitude` – Decimal degrees, positive east of Greenwich.
/// - `source_timestamp` – Wall-clock time the sentence was received.
/// - `utc_time` – Time of day reported by the receiver itself, if the sentence carried one.
///
/// # Example
///
/// ```rust
/// use common::position::GnssFix;
///
/// let fix = GnssFix::new(48.1173, 11.5166, chrono::Utc::now());
/// assert!(fix.utc_time().is_none());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GnssFix {
    latitude: f64,
    longitude: f64,
    #[serde(with = "millis")]
    source_timestamp: DateTime<Utc>,
    utc_time: Option<NaiveTime>,
}

impl GnssFix {
    pub fn new(latitude: f64, longitude: f64, source_timestamp: DateTime<Utc>) -> Self {
        GnssFix {
            latitude,
            longitude,
            source_timestamp,
            utc_time: None,
        }
    }

    /// Attaches the receiver reported time of day to the fix.
    pub fn with_utc_time(mut self, utc_time: Option<NaiveTime>) -> Self {
        self.utc_time = utc_time;
        self
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Latitude in decimal degrees.
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Longitude in decimal degrees.
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn source_timestamp(&self) -> DateTime<Utc> {
        self.source_timestamp
    }

    pub fn utc_time(&self) -> Option<NaiveTime> {
        self.utc_time
    }
}
