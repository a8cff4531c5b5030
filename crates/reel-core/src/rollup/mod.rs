//! Per-entity rollup rows and the rollup table.
//!
//! A [`RollupRow`] summarizes every distinct occurrence of one entity. The
//! table ([`Rollup`]) keeps rows in the order the aggregator produced them:
//! most recently first-seen entity first.
//!
//! # Invariants
//!
//! For every row:
//!
//! - `frequency == occurrences.len()`
//! - `first_seen == min(occurrences)` and `last_seen == max(occurrences)`
//! - `sum(year_counts) == frequency` when year counts are present
//!
//! Across the table, `entity_key` is unique. [`Rollup::check_invariants`]
//! verifies all of these.

pub mod codec;

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::event::Timestamp;

pub use codec::{
    OCCURRENCE_CODEC_VERSION, OccurrenceCodecError, decode_occurrences, encode_occurrences,
};

/// Histogram of occurrences keyed by two-digit year (`"24"` → 2024).
pub type YearCounts = BTreeMap<String, u64>;

/// Errors describing a rollup that breaks its structural invariants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RollupError {
    /// A row's derived fields disagree with its occurrence set.
    #[error("rollup row '{entity_key}' violates invariant: {detail}")]
    InvariantViolation { entity_key: String, detail: String },

    /// Two rows share an entity key.
    #[error("duplicate entity key '{0}' in rollup")]
    DuplicateEntity(String),
}

impl RollupError {
    /// Machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::RollupInvariantViolated
    }
}

/// Summary of every distinct occurrence of a single entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollupRow {
    /// Stable entity identity.
    pub entity_key: String,
    /// Title of the first event encountered for this entity.
    pub title: String,
    /// Earliest occurrence.
    pub first_seen: Timestamp,
    /// Latest occurrence.
    pub last_seen: Timestamp,
    /// Number of distinct occurrences.
    pub frequency: u64,
    /// Every distinct timestamp at which the entity was seen.
    pub occurrences: BTreeSet<Timestamp>,
    /// Resolved category.
    pub category: Option<String>,
    /// Occurrences per year, when year counting was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_counts: Option<YearCounts>,
}

impl RollupRow {
    /// Build a row from a non-empty occurrence set, deriving
    /// `first_seen`, `last_seen` and `frequency`.
    ///
    /// Returns `None` when `occurrences` is empty.
    #[must_use]
    pub fn from_occurrences(
        entity_key: impl Into<String>,
        title: impl Into<String>,
        occurrences: BTreeSet<Timestamp>,
        category: Option<String>,
        year_counts: Option<YearCounts>,
    ) -> Option<Self> {
        let first_seen = *occurrences.first()?;
        let last_seen = *occurrences.last()?;
        Some(Self {
            entity_key: entity_key.into(),
            title: title.into(),
            first_seen,
            last_seen,
            frequency: occurrences.len() as u64,
            occurrences,
            category,
            year_counts,
        })
    }

    /// Sum of all year buckets, if year counts are present.
    #[must_use]
    pub fn year_total(&self) -> Option<u64> {
        self.year_counts.as_ref().map(|counts| counts.values().sum())
    }

    /// Count for one two-digit year; absent years read as zero.
    #[must_use]
    pub fn count_for_year(&self, suffix: &str) -> u64 {
        self.year_counts
            .as_ref()
            .and_then(|counts| counts.get(suffix).copied())
            .unwrap_or(0)
    }

    /// Verify the per-row invariants.
    ///
    /// # Errors
    ///
    /// Returns [`RollupError::InvariantViolation`] naming the first broken rule.
    pub fn check(&self) -> Result<(), RollupError> {
        let violation = |detail: String| RollupError::InvariantViolation {
            entity_key: self.entity_key.clone(),
            detail,
        };

        if self.entity_key.is_empty() {
            return Err(violation("entity key is empty".into()));
        }
        if self.frequency != self.occurrences.len() as u64 {
            return Err(violation(format!(
                "frequency {} != {} occurrences",
                self.frequency,
                self.occurrences.len()
            )));
        }
        match (self.occurrences.first(), self.occurrences.last()) {
            (Some(first), Some(last)) => {
                if *first != self.first_seen {
                    return Err(violation(format!(
                        "first_seen {} != earliest occurrence {first}",
                        self.first_seen
                    )));
                }
                if *last != self.last_seen {
                    return Err(violation(format!(
                        "last_seen {} != latest occurrence {last}",
                        self.last_seen
                    )));
                }
            }
            _ => return Err(violation("occurrence set is empty".into())),
        }
        if let Some(total) = self.year_total() {
            if total != self.frequency {
                return Err(violation(format!(
                    "year counts sum to {total}, frequency is {}",
                    self.frequency
                )));
            }
        }
        Ok(())
    }
}

/// An ordered rollup table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rollup {
    rows: Vec<RollupRow>,
}

impl Rollup {
    /// Wrap rows as produced by the aggregator (order is preserved).
    #[must_use]
    pub const fn new(rows: Vec<RollupRow>) -> Self {
        Self { rows }
    }

    /// An empty rollup.
    #[must_use]
    pub const fn empty() -> Self {
        Self { rows: Vec::new() }
    }

    #[must_use]
    pub fn rows(&self) -> &[RollupRow] {
        &self.rows
    }

    #[must_use]
    pub fn into_rows(self) -> Vec<RollupRow> {
        self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RollupRow> {
        self.rows.iter()
    }

    /// Look up a row by entity key.
    #[must_use]
    pub fn get(&self, entity_key: &str) -> Option<&RollupRow> {
        self.rows.iter().find(|row| row.entity_key == entity_key)
    }

    /// Union of every row's occurrence set.
    #[must_use]
    pub fn known_timestamps(&self) -> HashSet<Timestamp> {
        self.rows
            .iter()
            .flat_map(|row| row.occurrences.iter().copied())
            .collect()
    }

    /// Total number of occurrences across all rows.
    #[must_use]
    pub fn total_occurrences(&self) -> u64 {
        self.rows.iter().map(|row| row.frequency).sum()
    }

    /// Verify per-row invariants and entity-key uniqueness.
    ///
    /// # Errors
    ///
    /// Returns the first [`RollupError`] found.
    pub fn check_invariants(&self) -> Result<(), RollupError> {
        let mut seen = HashSet::with_capacity(self.rows.len());
        for row in &self.rows {
            row.check()?;
            if !seen.insert(row.entity_key.as_str()) {
                return Err(RollupError::DuplicateEntity(row.entity_key.clone()));
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Rollup {
    type Item = &'a RollupRow;
    type IntoIter = std::slice::Iter<'a, RollupRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

impl From<Vec<RollupRow>> for Rollup {
    fn from(rows: Vec<RollupRow>) -> Self {
        Self::new(rows)
    }
}
