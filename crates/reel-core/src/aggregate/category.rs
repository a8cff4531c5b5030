//! Category resolution: priority label first, then the mode.

use std::collections::BTreeMap;

/// Category that wins whenever it appears for an entity, regardless of how
/// often other labels occur.
pub const PRIORITY_CATEGORY: &str = "YouTube Music";

/// Pick one category from the labels observed for an entity.
///
/// 1. [`PRIORITY_CATEGORY`] anywhere in the input wins outright.
/// 2. Otherwise the most frequent non-null label wins. Among labels sharing
///    the top count, the lexicographically smallest is returned, so the
///    result depends only on the multiset of labels.
/// 3. No non-null labels → `None`.
pub fn resolve_category<'a, I>(categories: I) -> Option<String>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for label in categories.into_iter().flatten() {
        if label == PRIORITY_CATEGORY {
            return Some(PRIORITY_CATEGORY.to_string());
        }
        *counts.entry(label).or_default() += 1;
    }

    // BTreeMap iterates in key order; keeping the first strict maximum gives
    // the smallest label among ties.
    let mut best: Option<(&str, usize)> = None;
    for (label, count) in counts {
        if best.is_none_or(|(_, top)| count > top) {
            best = Some((label, count));
        }
    }
    best.map(|(label, _)| label.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_wins() {
        let labels = [Some("A"), Some("A"), Some("B")];
        assert_eq!(resolve_category(labels), Some("A".into()));
    }

    #[test]
    fn priority_beats_majority() {
        let labels = [Some("YouTube Music"), Some("A"), Some("A")];
        assert_eq!(resolve_category(labels), Some(PRIORITY_CATEGORY.into()));
    }

    #[test]
    fn priority_wins_even_when_last() {
        let labels = [Some("YouTube"), Some("YouTube"), None, Some("YouTube Music")];
        assert_eq!(resolve_category(labels), Some(PRIORITY_CATEGORY.into()));
    }

    #[test]
    fn nulls_are_ignored_for_mode() {
        let labels = [None, None, None, Some("B")];
        assert_eq!(resolve_category(labels), Some("B".into()));
    }

    #[test]
    fn all_null_or_empty_is_none() {
        assert_eq!(resolve_category([None::<&str>, None]), None);
        assert_eq!(resolve_category(std::iter::empty::<Option<&str>>()), None);
    }

    #[test]
    fn tie_break_ignores_input_order() {
        let forward = [Some("B"), Some("A"), Some("A"), Some("B")];
        let backward = [Some("A"), Some("B"), Some("B"), Some("A")];
        assert_eq!(resolve_category(forward), Some("A".into()));
        assert_eq!(resolve_category(backward), Some("A".into()));
    }

    #[test]
    fn priority_match_is_exact() {
        let labels = [Some("youtube music"), Some("YouTube Music ")];
        assert_eq!(resolve_category(labels), Some("YouTube Music ".into()));
    }
}
