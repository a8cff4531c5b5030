//! Versioned text encoding for occurrence sets.
//!
//! ```text
//! v1:2024-01-01T10:00:00|2024-01-02T10:00:00
//! ```
//!
//! The payload is the canonical timestamp text of every member, sorted
//! ascending and joined with `|`. An empty set encodes as `v1:`. Canonical
//! timestamps never contain `|`, so no escaping is needed.

use std::collections::BTreeSet;

use crate::error::ErrorCode;
use crate::event::{Timestamp, TimestampError};

/// Version tag written in front of every encoded set.
pub const OCCURRENCE_CODEC_VERSION: &str = "v1";

const SEPARATOR: char = '|';

/// Errors raised while decoding an encoded occurrence set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OccurrenceCodecError {
    /// The value has no `vN:` prefix.
    #[error("occurrence set is missing its version prefix: '{0}'")]
    MissingVersion(String),

    /// The value was written by a newer codec.
    #[error("unsupported occurrence set version '{0}' (supported: {OCCURRENCE_CODEC_VERSION})")]
    UnsupportedVersion(String),

    /// One member failed to parse.
    #[error("occurrence #{index} is not a timestamp: {source}")]
    InvalidMember {
        index: usize,
        #[source]
        source: TimestampError,
    },

    /// The same timestamp appears twice.
    #[error("occurrence set lists {0} more than once")]
    DuplicateMember(String),
}

impl OccurrenceCodecError {
    /// Machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::InvalidOccurrenceSet
    }
}

/// Encode an occurrence set. Output is independent of insertion order.
#[must_use]
pub fn encode_occurrences(occurrences: &BTreeSet<Timestamp>) -> String {
    let body = occurrences
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(&SEPARATOR.to_string());
    format!("{OCCURRENCE_CODEC_VERSION}:{body}")
}

/// Decode a value produced by [`encode_occurrences`].
///
/// Member order in the payload is not significant.
///
/// # Errors
///
/// Returns [`OccurrenceCodecError`] on a missing or unknown version prefix,
/// an unparseable member, or a repeated member.
pub fn decode_occurrences(raw: &str) -> Result<BTreeSet<Timestamp>, OccurrenceCodecError> {
    let Some((version, body)) = raw.split_once(':') else {
        return Err(OccurrenceCodecError::MissingVersion(raw.to_string()));
    };
    if !version.starts_with('v') {
        return Err(OccurrenceCodecError::MissingVersion(raw.to_string()));
    }
    if version != OCCURRENCE_CODEC_VERSION {
        return Err(OccurrenceCodecError::UnsupportedVersion(version.to_string()));
    }

    let mut out = BTreeSet::new();
    if body.is_empty() {
        return Ok(out);
    }

    for (index, member) in body.split(SEPARATOR).enumerate() {
        let ts = Timestamp::parse(member)
            .map_err(|source| OccurrenceCodecError::InvalidMember { index, source })?;
        if !out.insert(ts) {
            return Err(OccurrenceCodecError::DuplicateMember(ts.to_string()));
        }
    }
    Ok(out)
}
