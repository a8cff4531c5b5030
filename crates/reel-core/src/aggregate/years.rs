//! Year-bucket counting.

use std::collections::BTreeSet;

use crate::event::{EventRecord, Timestamp};
use crate::rollup::YearCounts;

/// Count distinct event timestamps per two-digit year.
///
/// Events without a timestamp are skipped. Two events with the same
/// timestamp count once, which keeps `sum(year_counts) == frequency` for the
/// rollup row built from the same events. Only years that occur get a key.
pub fn year_counts<'a, I>(events: I) -> YearCounts
where
    I: IntoIterator<Item = &'a EventRecord>,
{
    let distinct: BTreeSet<Timestamp> = events
        .into_iter()
        .filter_map(|event| event.timestamp)
        .collect();
    year_counts_from_occurrences(&distinct)
}

/// Count an already-deduplicated occurrence set per two-digit year.
#[must_use]
pub fn year_counts_from_occurrences(occurrences: &BTreeSet<Timestamp>) -> YearCounts {
    let mut counts = YearCounts::new();
    for ts in occurrences {
        *counts.entry(ts.year_suffix()).or_default() += 1;
    }
    counts
}
