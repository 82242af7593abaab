// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! (De)serializes a UTC timestamp as milliseconds since the unix epoch,
//! the same representation the log files use for their timestamp column.

use chrono::{DateTime, Utc};
use serde::{self, Deserialize, Deserializer, Serializer};

pub fn serialize<S>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_i64(time.timestamp_millis())
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let millis = i64::deserialize(deserializer)?;
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| serde::de::Error::custom(format!("timestamp {millis} out of range")))
}
