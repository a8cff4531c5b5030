//! Normalized event records consumed by the aggregation engine.
//!
//! An [`EventRecord`] is one row of the normalized activity stream: the
//! entity it belongs to, the display title seen on that row, an optional
//! [`Timestamp`] and an optional category (the Takeout `header`).
//!
//! Timestamps are parsed once, at the edge. The engine itself only ever
//! compares, orders and buckets them.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

/// Accepted textual layouts, tried in order.
const PARSE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Canonical layout used for display and persistence.
///
/// `%.f` omits the fraction when it is zero, so whole-second values render
/// as `2024-01-01T10:00:00`.
const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Error returned when text cannot be parsed into a [`Timestamp`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid timestamp '{raw}': expected YYYY-MM-DDTHH:MM:SS[.fff]")]
pub struct TimestampError {
    /// The rejected input.
    pub raw: String,
}

impl TimestampError {
    /// Machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::InvalidTimestamp
    }
}

/// A timezone-naive event time.
///
/// Equality is exact: two events collapse into one occurrence only when
/// their timestamps are identical to the nanosecond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(NaiveDateTime);

impl Timestamp {
    /// Wrap an already-parsed calendar value.
    #[must_use]
    pub const fn from_naive(value: NaiveDateTime) -> Self {
        Self(value)
    }

    /// Parse ISO-8601-like text (`T` or space separator, optional fraction,
    /// optional trailing `Z`).
    ///
    /// # Errors
    ///
    /// Returns [`TimestampError`] if none of the accepted layouts match.
    pub fn parse(raw: &str) -> Result<Self, TimestampError> {
        let trimmed = raw.trim();
        let trimmed = trimmed.strip_suffix('Z').unwrap_or(trimmed);
        PARSE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
            .map(Self)
            .ok_or_else(|| TimestampError {
                raw: raw.to_string(),
            })
    }

    /// The underlying calendar value.
    #[must_use]
    pub const fn as_naive(&self) -> NaiveDateTime {
        self.0
    }

    /// Calendar year of this timestamp.
    #[must_use]
    pub fn year(&self) -> i32 {
        self.0.year()
    }

    /// Two-character year bucket key, e.g. `"24"` for 2024.
    #[must_use]
    pub fn year_suffix(&self) -> String {
        format!("{:02}", self.0.year().rem_euclid(100))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(CANONICAL_FORMAT))
    }
}

impl FromStr for Timestamp {
    type Err = TimestampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// One normalized activity event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Stable identity of the tracked thing (a canonical URL for Takeout data).
    pub entity_key: String,
    /// Display title observed on this row.
    pub title: String,
    /// Event time, or `None` when the upstream value failed to parse.
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
    /// Category label (`header`), if any.
    #[serde(default)]
    pub category: Option<String>,
}

impl EventRecord {
    /// Build an event record.
    pub fn new(
        entity_key: impl Into<String>,
        title: impl Into<String>,
        timestamp: Option<Timestamp>,
        category: Option<String>,
    ) -> Self {
        Self {
            entity_key: entity_key.into(),
            title: title.into(),
            timestamp,
            category,
        }
    }

    /// Returns `true` when the event carries a usable timestamp.
    #[must_use]
    pub const fn has_timestamp(&self) -> bool {
        self.timestamp.is_some()
    }
}
