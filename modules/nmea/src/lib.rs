// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! NMEA 0183 codec of the GNSS logger
//!
//! Extracts fixes from the fix-data sentence of a GNSS receiver. The codec is
//! pure: it never performs I/O and keeps no state between sentences, a garbled
//! line never affects the next one.

use chrono::{DateTime, NaiveTime, Utc};
use common::position::GnssFix;
use std::fmt;
use thiserror::Error;

pub mod accumulator;

pub use accumulator::LineAccumulator;

/// Sentence identifier of the GPS fix-data sentence.
pub const GPGGA: &str = "$GPGGA";

const LATITUDE_FIELD: usize = 2;
const LATITUDE_HEMISPHERE_FIELD: usize = 3;
const LONGITUDE_FIELD: usize = 4;
const LONGITUDE_HEMISPHERE_FIELD: usize = 5;
const REQUIRED_FIELDS: usize = LONGITUDE_HEMISPHERE_FIELD + 1;

/// Reasons why a line doesn't yield a [`GnssFix`].
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ParseError {
    /// The first field is not the configured sentence identifier.
    #[error("unsupported sentence type \"{0}\"")]
    UnsupportedSentence(String),

    /// Fields are missing or empty.
    #[error("malformed sentence: {0}")]
    MalformedSentence(String),

    /// Degree or minute part isn't numeric or the hemisphere is unknown.
    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(String),

    /// Only reported with enabled checksum validation.
    #[error("checksum mismatch, expected {expected:02X} got {actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },
}

/// Hemisphere letter that follows a coordinate value.
///
/// `N` and `S` always belong to the latitude axis, `E` and `W` to the longitude axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Hemisphere {
    North,
    South,
    East,
    West,
}

impl Hemisphere {
    pub fn from_field(field: &str) -> Result<Self, ParseError> {
        match field {
            "N" => Ok(Hemisphere::North),
            "S" => Ok(Hemisphere::South),
            "E" => Ok(Hemisphere::East),
            "W" => Ok(Hemisphere::West),
            other => Err(ParseError::InvalidCoordinate(format!(
                "unknown hemisphere \"{other}\""
            ))),
        }
    }

    pub fn is_latitude(&self) -> bool {
        matches!(self, Hemisphere::North | Hemisphere::South)
    }

    /// Digits of the degree prefix: `DDMM.MMMM` for latitudes, `DDDMM.MMMM` for longitudes.
    fn degree_digits(&self) -> usize {
        if self.is_latitude() { 2 } else { 3 }
    }

    fn is_negative(&self) -> bool {
        matches!(self, Hemisphere::South | Hemisphere::West)
    }
}

impl fmt::Display for Hemisphere {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            Hemisphere::North => "N",
            Hemisphere::South => "S",
            Hemisphere::East => "E",
            Hemisphere::West => "W",
        };
        f.write_str(letter)
    }
}

/// A coordinate in the degrees-minutes notation of the receiver.
#[derive(Clone, Debug, PartialEq)]
pub struct Coordinate<'a> {
    pub degrees_minutes: &'a str,
    pub hemisphere: Hemisphere,
}

impl Coordinate<'_> {
    pub fn to_decimal(&self) -> Result<f64, ParseError> {
        convert_to_decimal(self.degrees_minutes, self.hemisphere)
    }
}

/// Converts a degrees-minutes value into signed decimal degrees.
///
/// The value is `degrees + minutes / 60`, negated for the southern and the
/// western hemisphere.
///
/// ```
/// use nmea::{Hemisphere, convert_to_decimal};
///
/// let lat = convert_to_decimal("4807.038", Hemisphere::South).unwrap();
/// assert!((lat + 48.1173).abs() < 1e-9);
/// ```
pub fn convert_to_decimal(value: &str, hemisphere: Hemisphere) -> Result<f64, ParseError> {
    let split = hemisphere.degree_digits();
    let (Some(degrees), Some(minutes)) = (value.get(..split), value.get(split..)) else {
        return Err(ParseError::InvalidCoordinate(format!(
            "\"{value}\" is too short for hemisphere {hemisphere}"
        )));
    };
    if !degrees.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidCoordinate(format!(
            "non numeric degrees \"{degrees}\""
        )));
    }
    let degrees: f64 = degrees
        .parse::<u16>()
        .map_err(|e| ParseError::InvalidCoordinate(format!("degrees \"{degrees}\": {e}")))?
        .into();
    let minutes: f64 = minutes
        .parse()
        .map_err(|e| ParseError::InvalidCoordinate(format!("minutes \"{minutes}\": {e}")))?;
    if !minutes.is_finite() || minutes.is_sign_negative() {
        return Err(ParseError::InvalidCoordinate(format!(
            "minutes out of range in \"{value}\""
        )));
    }
    let decimal = degrees + minutes / 60.0;
    Ok(if hemisphere.is_negative() {
        -decimal
    } else {
        decimal
    })
}

/// XOR checksum of a sentence: all bytes between `$` and `*`.
///
/// Returns `None` if the line has no `*` delimiter or the transmitted
/// checksum isn't two hex digits, otherwise `(transmitted, computed)`.
pub fn checksum(line: &str) -> Option<(u8, u8)> {
    let body = line.strip_prefix('$').unwrap_or(line);
    let (payload, transmitted) = body.rsplit_once('*')?;
    let transmitted = transmitted.trim_end();
    if transmitted.len() != 2 {
        return None;
    }
    let transmitted = u8::from_str_radix(transmitted, 16).ok()?;
    let computed = payload.bytes().fold(0u8, |acc, b| acc ^ b);
    Some((transmitted, computed))
}

/// Extracts [`GnssFix`]es from fix-data sentences.
#[derive(Clone, Debug)]
pub struct NmeaCodec {
    identifier: String,
    validate_checksum: bool,
}

impl Default for NmeaCodec {
    fn default() -> Self {
        NmeaCodec::new(GPGGA)
    }
}

impl NmeaCodec {
    /// Creates a codec that accepts sentences starting with `identifier`, e.g. `$GNGGA`.
    pub fn new(identifier: &str) -> Self {
        NmeaCodec {
            identifier: identifier.to_owned(),
            validate_checksum: false,
        }
    }

    /// Enables verification of the trailing `*hh` checksum.
    ///
    /// Off by default. With validation enabled, sentences without a checksum
    /// or with a wrong one are rejected.
    pub fn with_checksum_validation(mut self, enabled: bool) -> Self {
        self.validate_checksum = enabled;
        self
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Parses `line` into a fix that is timestamped with the current time.
    pub fn parse_fix(&self, line: &str) -> Result<GnssFix, ParseError> {
        self.parse_fix_at(line, Utc::now())
    }

    /// Parses `line` into a fix that is timestamped with `received_at`.
    pub fn parse_fix_at(&self, line: &str, received_at: DateTime<Utc>) -> Result<GnssFix, ParseError> {
        let line = line.trim();
        let fields: Vec<&str> = line.split(',').collect();
        if fields[0] != self.identifier {
            return Err(ParseError::UnsupportedSentence(fields[0].to_owned()));
        }
        if fields.len() < REQUIRED_FIELDS {
            return Err(ParseError::MalformedSentence(format!(
                "{} fields, at least {} required",
                fields.len(),
                REQUIRED_FIELDS
            )));
        }
        if self.validate_checksum {
            match checksum(line) {
                Some((expected, actual)) if expected != actual => {
                    return Err(ParseError::ChecksumMismatch { expected, actual });
                }
                Some(_) => (),
                None => {
                    return Err(ParseError::MalformedSentence("missing or invalid checksum".to_owned()));
                }
            }
        }
        let latitude = coordinate(&fields, LATITUDE_FIELD, LATITUDE_HEMISPHERE_FIELD)?;
        let longitude = coordinate(&fields, LONGITUDE_FIELD, LONGITUDE_HEMISPHERE_FIELD)?;
        if !latitude.hemisphere.is_latitude() || longitude.hemisphere.is_latitude() {
            return Err(ParseError::InvalidCoordinate(format!(
                "hemispheres {} and {} don't match the axes",
                latitude.hemisphere, longitude.hemisphere
            )));
        }
        let fix = GnssFix::new(latitude.to_decimal()?, longitude.to_decimal()?, received_at)
            .with_utc_time(parse_utc_time(fields[1]));
        Ok(fix)
    }
}

/// Parses `line` with the default `$GPGGA` codec.
///
/// Returns `None` for every line that doesn't carry a complete fix.
pub fn parse_fix(line: &str) -> Option<GnssFix> {
    NmeaCodec::default().parse_fix(line).ok()
}

fn coordinate<'a>(
    fields: &[&'a str],
    value_field: usize,
    hemisphere_field: usize,
) -> Result<Coordinate<'a>, ParseError> {
    let value = fields[value_field];
    if value.is_empty() {
        return Err(ParseError::MalformedSentence(format!(
            "empty coordinate in field {value_field}"
        )));
    }
    Ok(Coordinate {
        degrees_minutes: value,
        hemisphere: Hemisphere::from_field(fields[hemisphere_field])?,
    })
}

/// Receiver time of day in `hhmmss` or `hhmmss.ss` notation.
fn parse_utc_time(field: &str) -> Option<NaiveTime> {
    if field.is_empty() {
        return None;
    }
    NaiveTime::parse_from_str(field, "%H%M%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(field, "%H%M%S"))
        .ok()
}
