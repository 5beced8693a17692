//! Core sample types for radarlink.
//!
//! A [`Sample`] is one decoded reading from the rotating sensor: the servo
//! angle in degrees and the measured distance in centimeters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum distance, in centimeters, considered "in range".
pub const RANGE_MAX_CM: u32 = 400;

/// Upper bound of the servo sweep, in degrees.
pub const SWEEP_MAX_DEGREES: i32 = 180;

/// Detection classification of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    /// Distance within [`RANGE_MAX_CM`].
    InRange,
    /// Distance beyond [`RANGE_MAX_CM`].
    OutOfRange,
}

impl Status {
    /// Classify a distance.
    #[must_use]
    pub fn classify(distance: u32) -> Self {
        if distance <= RANGE_MAX_CM {
            Self::InRange
        } else {
            Self::OutOfRange
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InRange => write!(f, "in-range"),
            Self::OutOfRange => write!(f, "out-of-range"),
        }
    }
}

/// A single (angle, distance) reading.
///
/// Serializes to the history log format: `{angle, distance, fecha_hora}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// Servo angle in degrees.
    pub angle: i32,

    /// Measured distance in centimeters.
    pub distance: u32,

    /// When the sample was decoded or generated.
    #[serde(rename = "fecha_hora", with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
}

impl Sample {
    /// Create a sample stamped with the current wall clock.
    #[must_use]
    pub fn new(angle: i32, distance: u32) -> Self {
        Self::at(angle, distance, Utc::now())
    }

    /// Create a sample with an explicit timestamp.
    #[must_use]
    pub fn at(angle: i32, distance: u32, timestamp: DateTime<Utc>) -> Self {
        Self {
            angle,
            distance,
            timestamp,
        }
    }

    /// Detection status of this sample.
    #[must_use]
    pub fn status(&self) -> Status {
        Status::classify(self.distance)
    }

    /// Whether the distance is within [`RANGE_MAX_CM`].
    #[must_use]
    pub fn is_in_range(&self) -> bool {
        self.status() == Status::InRange
    }
}

/// ISO-8601 with millisecond precision and a `Z` suffix, e.g.
/// `2025-01-16T14:32:16.123Z`. Parsing accepts any RFC 3339 timestamp.
mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
