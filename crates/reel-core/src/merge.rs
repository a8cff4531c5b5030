//! Merge a new event batch into a prior rollup.
//!
//! Without a prior rollup (or with an empty one) a merge is a plain
//! [`aggregate`] of the batch. With one, the merge is incremental:
//!
//! 1. Collect every timestamp the prior rollup already knows.
//! 2. Keep only batch events whose timestamp is not known (the *delta*).
//! 3. If the delta is empty, stop: nothing to update.
//! 4. Pin the category of every delta event whose entity the prior rollup
//!    already has to the prior category. Categories are sticky.
//! 5. Expand each prior row back into one synthetic event per occurrence.
//! 6. Aggregate synthetic + delta events into the replacement rollup.
//!
//! # Known timestamp filter is global
//!
//! Step 1 unions timestamps across *all* entities. A new event for entity B
//! is dropped when entity A already has an occurrence at exactly the same
//! second. One person rarely produces two events in the same second, but
//! merged exports from several accounts can.
//!
//! # Cost
//!
//! Every incremental merge re-aggregates the full history. Work grows with
//! total occurrences, not just the delta.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::aggregate::aggregate;
use crate::event::EventRecord;
use crate::rollup::Rollup;

/// Which merge path ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// No usable prior rollup; the batch was aggregated on its own.
    Fresh,
    /// The batch was folded into a prior rollup.
    Incremental,
}

impl MergeMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Incremental => "incremental",
        }
    }
}

/// Result of a merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Built from the batch alone.
    Fresh(Rollup),
    /// Prior rollup extended with new occurrences.
    Updated(Rollup),
    /// Every batch event was already known; the prior rollup is returned
    /// unchanged and does not need to be written back.
    NoNewData(Rollup),
}

impl MergeOutcome {
    #[must_use]
    pub const fn rollup(&self) -> &Rollup {
        match self {
            Self::Fresh(rollup) | Self::Updated(rollup) | Self::NoNewData(rollup) => rollup,
        }
    }

    #[must_use]
    pub fn into_rollup(self) -> Rollup {
        match self {
            Self::Fresh(rollup) | Self::Updated(rollup) | Self::NoNewData(rollup) => rollup,
        }
    }

    /// `false` only for [`MergeOutcome::NoNewData`].
    #[must_use]
    pub const fn needs_write(&self) -> bool {
        !matches!(self, Self::NoNewData(_))
    }

    /// Short label for logs and CLI output.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Fresh(_) => "fresh",
            Self::Updated(_) => "updated",
            Self::NoNewData(_) => "no_new_data",
        }
    }
}

/// Counters describing one merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub mode: MergeMode,
    /// Events in the incoming batch.
    pub events_in: usize,
    /// Batch events that passed the known-timestamp filter.
    pub delta_events: usize,
    /// Batch events dropped because their timestamp was already known.
    pub suppressed: usize,
    /// Batch events without a timestamp.
    pub untimed: usize,
    /// Delta events whose category was replaced by the prior category.
    pub category_overrides: usize,
    /// Entities in the output that the prior rollup did not have.
    pub new_entities: usize,
    /// Rows in the resulting rollup.
    pub rows_out: usize,
    pub elapsed: Duration,
}

/// Merge `new_events` into `prior`.
///
/// See the module docs for the protocol.
#[must_use]
pub fn merge(new_events: &[EventRecord], prior: Option<&Rollup>) -> MergeOutcome {
    merge_with_report(new_events, prior).0
}

/// Like [`merge`], also returning a [`MergeReport`].
#[must_use]
pub fn merge_with_report(
    new_events: &[EventRecord],
    prior: Option<&Rollup>,
) -> (MergeOutcome, MergeReport) {
    let start = Instant::now();
    let untimed = new_events.iter().filter(|e| !e.has_timestamp()).count();

    let Some(prior) = prior.filter(|rollup| !rollup.is_empty()) else {
        let rollup = aggregate(new_events, true);
        let report = MergeReport {
            mode: MergeMode::Fresh,
            events_in: new_events.len(),
            delta_events: new_events.len(),
            suppressed: 0,
            untimed,
            category_overrides: 0,
            new_entities: rollup.len(),
            rows_out: rollup.len(),
            elapsed: start.elapsed(),
        };
        log_report(&report, "fresh");
        return (MergeOutcome::Fresh(rollup), report);
    };

    let known = prior.known_timestamps();
    let mut delta: Vec<EventRecord> = new_events
        .iter()
        .filter(|event| event.timestamp.is_none_or(|ts| !known.contains(&ts)))
        .cloned()
        .collect();
    let suppressed = new_events.len() - delta.len();
    debug!(
        known = known.len(),
        delta = delta.len(),
        suppressed,
        "filtered batch against known timestamps"
    );

    if delta.is_empty() {
        let report = MergeReport {
            mode: MergeMode::Incremental,
            events_in: new_events.len(),
            delta_events: delta.len(),
            suppressed,
            untimed,
            category_overrides: 0,
            new_entities: 0,
            rows_out: prior.len(),
            elapsed: start.elapsed(),
        };
        log_report(&report, "no_new_data");
        return (MergeOutcome::NoNewData(prior.clone()), report);
    }

    let known_category: HashMap<&str, Option<&str>> = prior
        .iter()
        .map(|row| (row.entity_key.as_str(), row.category.as_deref()))
        .collect();

    let mut category_overrides = 0usize;
    for event in &mut delta {
        if let Some(&sticky) = known_category.get(event.entity_key.as_str()) {
            if event.category.as_deref() != sticky {
                category_overrides += 1;
                event.category = sticky.map(str::to_string);
            }
        }
    }

    let delta_events = delta.len();
    let mut combined: Vec<EventRecord> =
        Vec::with_capacity(usize::try_from(prior.total_occurrences()).unwrap_or(0) + delta_events);
    combined.extend(reconstruct_events(prior));
    combined.extend(delta);

    let rollup = aggregate(&combined, true);

    let prior_keys: HashSet<&str> = known_category.keys().copied().collect();
    let new_entities = rollup
        .iter()
        .filter(|row| !prior_keys.contains(row.entity_key.as_str()))
        .count();

    let report = MergeReport {
        mode: MergeMode::Incremental,
        events_in: new_events.len(),
        delta_events,
        suppressed,
        untimed,
        category_overrides,
        new_entities,
        rows_out: rollup.len(),
        elapsed: start.elapsed(),
    };
    log_report(&report, "updated");
    (MergeOutcome::Updated(rollup), report)
}

/// Expand a rollup back into one event per occurrence, carrying each row's
/// title and category. Rows are expanded in table order.
pub fn reconstruct_events(rollup: &Rollup) -> impl Iterator<Item = EventRecord> + '_ {
    rollup.iter().flat_map(|row| {
        row.occurrences.iter().map(move |ts| {
            EventRecord::new(
                row.entity_key.clone(),
                row.title.clone(),
                Some(*ts),
                row.category.clone(),
            )
        })
    })
}

fn log_report(report: &MergeReport, outcome: &str) {
    info!(
        mode = report.mode.as_str(),
        outcome,
        events_in = report.events_in,
        delta = report.delta_events,
        suppressed = report.suppressed,
        untimed = report.untimed,
        category_overrides = report.category_overrides,
        new_entities = report.new_entities,
        rows = report.rows_out,
        elapsed_us = u64::try_from(report.elapsed.as_micros()).unwrap_or(u64::MAX),
        "merge complete"
    );
}
