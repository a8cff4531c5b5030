//! Event batch → per-entity rollup.
//!
//! [`aggregate`] is a pure function of its input. It partitions events by
//! `entity_key` (partitions are ordered by first appearance), folds each
//! partition into a [`RollupRow`], and sorts rows by `first_seen`
//! descending. The sort is stable, so entities first seen at the same
//! instant keep their partition order.
//!
//! # Order sensitivity
//!
//! A row's `title` is the title of the first event of its partition. Feeding
//! the same events in a different order can therefore change titles (and
//! the order of rows that tie on `first_seen`). Every other field depends
//! only on the set of events.

pub mod category;
pub mod years;

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::event::{EventRecord, Timestamp};
use crate::rollup::{Rollup, RollupRow};

pub use category::{PRIORITY_CATEGORY, resolve_category};
pub use years::{year_counts, year_counts_from_occurrences};

/// Events for one entity, accumulated in input order.
#[derive(Debug)]
struct Partition<'a> {
    entity_key: &'a str,
    title: &'a str,
    occurrences: BTreeSet<Timestamp>,
    categories: Vec<Option<&'a str>>,
}

impl<'a> Partition<'a> {
    fn open(event: &'a EventRecord) -> Self {
        Self {
            entity_key: &event.entity_key,
            title: &event.title,
            occurrences: BTreeSet::new(),
            categories: Vec::new(),
        }
    }

    fn push(&mut self, event: &'a EventRecord) {
        if let Some(ts) = event.timestamp {
            self.occurrences.insert(ts);
        }
        self.categories.push(event.category.as_deref());
    }

    fn into_row(self, compute_year_counts: bool) -> Option<RollupRow> {
        let category = resolve_category(self.categories.iter().copied());
        let years = compute_year_counts.then(|| year_counts_from_occurrences(&self.occurrences));
        RollupRow::from_occurrences(
            self.entity_key,
            self.title,
            self.occurrences,
            category,
            years,
        )
    }
}

/// Reduce `events` to one rollup row per entity.
///
/// - Entities whose events all lack a timestamp are left out.
/// - `year_counts` is filled only when `compute_year_counts` is set.
/// - An empty batch yields an empty rollup.
pub fn aggregate<'a, I>(events: I, compute_year_counts: bool) -> Rollup
where
    I: IntoIterator<Item = &'a EventRecord>,
{
    let mut index: HashMap<&'a str, usize> = HashMap::new();
    let mut partitions: Vec<Partition<'a>> = Vec::new();
    let mut events_in = 0usize;

    for event in events {
        events_in += 1;
        let slot = *index.entry(event.entity_key.as_str()).or_insert_with(|| {
            partitions.push(Partition::open(event));
            partitions.len() - 1
        });
        partitions[slot].push(event);
    }

    let entities = partitions.len();
    let mut rows: Vec<RollupRow> = partitions
        .into_iter()
        .filter_map(|partition| partition.into_row(compute_year_counts))
        .collect();

    // Stable: ties on first_seen keep partition order.
    rows.sort_by(|a, b| b.first_seen.cmp(&a.first_seen));

    debug!(
        events = events_in,
        entities,
        rows = rows.len(),
        excluded = entities - rows.len(),
        "aggregated event batch"
    );

    Rollup::new(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(raw: &str) -> Timestamp {
        Timestamp::parse(raw).expect("valid timestamp")
    }

    fn ev(key: &str, title: &str, when: Option<&str>, category: Option<&str>) -> EventRecord {
        EventRecord::new(key, title, when.map(ts), category.map(str::to_string))
    }

    #[test]
    fn empty_batch_gives_empty_rollup() {
        let none: Vec<EventRecord> = Vec::new();
        assert!(aggregate(&none, true).is_empty());
    }

    #[test]
    fn entity_without_timestamps_is_excluded() {
        let events = vec![
            ev("E1", "T1", None, Some("YouTube")),
            ev("E2", "T2", Some("2024-01-01T00:00:00"), None),
        ];
        let rollup = aggregate(&events, true);
        assert_eq!(rollup.len(), 1);
        assert!(rollup.get("E1").is_none());
    }

    #[test]
    fn duplicate_timestamps_collapse() {
        let events = vec![
            ev("E1", "T1", Some("2024-01-01T10:00:00"), None),
            ev("E1", "T1", Some("2024-01-01T10:00:00"), None),
            ev("E1", "T1", Some("2024-01-01T11:00:00"), None),
        ];
        let rollup = aggregate(&events, true);
        let row = rollup.get("E1").expect("row");
        assert_eq!(row.frequency, 2);
        assert_eq!(row.year_counts.as_ref().and_then(|y| y.get("24")), Some(&2));
        assert!(rollup.check_invariants().is_ok());
    }

    #[test]
    fn title_comes_from_first_event_in_input_order() {
        let events = vec![
            ev("E1", "later title", Some("2024-02-01T00:00:00"), None),
            ev("E1", "earlier title", Some("2024-01-01T00:00:00"), None),
        ];
        let rollup = aggregate(&events, false);
        assert_eq!(rollup.rows()[0].title, "later title");

        let reversed: Vec<_> = events.iter().rev().cloned().collect();
        let rollup = aggregate(&reversed, false);
        assert_eq!(rollup.rows()[0].title, "earlier title");
    }

    #[test]
    fn title_can_come_from_event_without_timestamp() {
        let events = vec![
            ev("E1", "first", None, None),
            ev("E1", "second", Some("2024-01-01T00:00:00"), None),
        ];
        assert_eq!(aggregate(&events, false).rows()[0].title, "first");
    }

    #[test]
    fn rows_sorted_by_first_seen_descending() {
        let events = vec![
            ev("old", "o", Some("2020-01-01T00:00:00"), None),
            ev("new", "n", Some("2024-01-01T00:00:00"), None),
            ev("mid", "m", Some("2022-01-01T00:00:00"), None),
            ev("old", "o", Some("2025-01-01T00:00:00"), None),
        ];
        let keys: Vec<_> = aggregate(&events, false)
            .iter()
            .map(|row| row.entity_key.clone())
            .collect();
        assert_eq!(keys, ["new", "mid", "old"]);
    }

    #[test]
    fn ties_keep_partition_order() {
        let events = vec![
            ev("b", "b", Some("2024-01-01T00:00:00"), None),
            ev("a", "a", Some("2024-01-01T00:00:00"), None),
            ev("c", "c", Some("2024-01-01T00:00:00"), None),
        ];
        let keys: Vec<_> = aggregate(&events, false)
            .iter()
            .map(|row| row.entity_key.clone())
            .collect();
        assert_eq!(keys, ["b", "a", "c"]);
    }

    #[test]
    fn year_counts_only_when_requested() {
        let events = vec![ev("E1", "T1", Some("2024-01-01T00:00:00"), None)];
        assert!(aggregate(&events, false).rows()[0].year_counts.is_none());
        assert!(aggregate(&events, true).rows()[0].year_counts.is_some());
    }

    #[test]
    fn category_votes_include_untimed_events() {
        let events = vec![
            ev("E1", "T1", Some("2024-01-01T00:00:00"), Some("YouTube")),
            ev("E1", "T1", None, Some("YouTube Music")),
        ];
        assert_eq!(
            aggregate(&events, true).rows()[0].category.as_deref(),
            Some(PRIORITY_CATEGORY)
        );
    }
}
