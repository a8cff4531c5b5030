//! Google Takeout activity export → normalized [`EventRecord`]s.
//!
//! A Takeout `watch-history.json` is a JSON array of activity objects:
//!
//! ```json
//! {
//!   "header": "YouTube Music",
//!   "title": "Watched Some Song",
//!   "titleUrl": "https://music.youtube.com/watch?v=abc",
//!   "subtitles": [{ "name": "Some Artist", "url": "..." }],
//!   "time": "2024-01-01T04:30:00.123Z",
//!   "products": ["YouTube"]
//! }
//! ```
//!
//! Normalization drops ad rows and rows that cannot be keyed, folds
//! `music.` URLs onto `www.`, strips the `Watched ` title prefix, and shifts
//! the UTC time by [`NormalizeOptions::time_offset`]. An unparseable time
//! becomes a `None` timestamp rather than an error.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, TimeDelta};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ErrorCode;
use crate::event::{EventRecord, Timestamp};

/// Time layout of the leading 19 characters of a Takeout `time` field.
const TAKEOUT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const TAKEOUT_TIME_LEN: usize = 19;

const AD_MARKER: &str = "Google Ads";
const SEARCH_HOST: &str = "www.google.com";
const WATCHED_PREFIX: &str = "Watched ";

/// Default shift applied to Takeout UTC times (+05:30).
pub const DEFAULT_OFFSET_MINUTES: i64 = 330;

/// Largest accepted shift in either direction.
pub const MAX_OFFSET_MINUTES: i64 = 24 * 60;

/// Errors raised while reading a Takeout export.
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    /// The document is not valid JSON for the expected shape.
    #[error("takeout export is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The document is valid JSON but neither an array nor an object.
    #[error("takeout export must be a JSON array or object, found {0}")]
    UnsupportedShape(&'static str),

    /// The time offset is more than a day in either direction.
    #[error("time offset of {0} minutes is out of range (max 1440)")]
    OffsetOutOfRange(i64),
}

impl NormalizeError {
    /// Machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidJson(_) | Self::UnsupportedShape(_) => ErrorCode::MalformedTakeoutExport,
            Self::OffsetOutOfRange(_) => ErrorCode::InvalidTimeOffset,
        }
    }
}

/// A `{ name, url }` pair as found in `subtitles` and `details`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TakeoutLink {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// One activity object from a Takeout history export. Unknown fields are
/// ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TakeoutRecord {
    #[serde(default)]
    pub header: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub title_url: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub subtitles: Vec<TakeoutLink>,
    #[serde(default)]
    pub details: Vec<TakeoutLink>,
    #[serde(default)]
    pub description: Option<String>,
}

impl TakeoutRecord {
    fn mentions_ads(&self) -> bool {
        self.subtitles
            .iter()
            .chain(&self.details)
            .filter_map(|link| link.name.as_deref())
            .any(|name| name.contains(AD_MARKER))
    }
}

/// Parameters threaded into normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Added to every parsed Takeout time (Takeout times are UTC).
    pub time_offset: TimeDelta,
    /// Stable-sort the normalized batch newest first (untimed rows last).
    pub newest_first: bool,
}

impl NormalizeOptions {
    /// Options with an offset expressed in minutes.
    ///
    /// # Errors
    ///
    /// [`NormalizeError::OffsetOutOfRange`] when `minutes` exceeds
    /// [`MAX_OFFSET_MINUTES`] in either direction.
    pub fn with_offset_minutes(minutes: i64) -> Result<Self, NormalizeError> {
        if minutes.unsigned_abs() > MAX_OFFSET_MINUTES.unsigned_abs() {
            return Err(NormalizeError::OffsetOutOfRange(minutes));
        }
        let time_offset =
            TimeDelta::try_minutes(minutes).ok_or(NormalizeError::OffsetOutOfRange(minutes))?;
        Ok(Self {
            time_offset,
            ..Self::default()
        })
    }
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            time_offset: TimeDelta::minutes(DEFAULT_OFFSET_MINUTES),
            newest_first: true,
        }
    }
}

/// Counters for one normalization run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    /// Records read from the input.
    pub records_in: usize,
    /// Events emitted.
    pub events_out: usize,
    /// Dropped because a subtitle or detail name mentions Google Ads.
    pub dropped_ads: usize,
    /// Dropped for a missing or blank `titleUrl`.
    pub dropped_missing_url: usize,
    /// Dropped because `titleUrl` points at Google search.
    pub dropped_search_urls: usize,
    /// Emitted with a `None` timestamp.
    pub untimed: usize,
}

impl NormalizeStats {
    fn absorb(&mut self, other: &Self) {
        self.records_in += other.records_in;
        self.events_out += other.events_out;
        self.dropped_ads += other.dropped_ads;
        self.dropped_missing_url += other.dropped_missing_url;
        self.dropped_search_urls += other.dropped_search_urls;
        self.untimed += other.untimed;
    }
}

/// Normalized events plus the counters describing how they were produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeOutput {
    pub events: Vec<EventRecord>,
    pub stats: NormalizeStats,
}

/// Parse a Takeout document. A single object is treated as a one-record
/// array.
///
/// # Errors
///
/// Returns [`NormalizeError`] if the JSON is invalid or has the wrong shape.
pub fn parse_takeout(json: &str) -> Result<Vec<TakeoutRecord>, NormalizeError> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    match value {
        serde_json::Value::Array(_) => Ok(serde_json::from_value(value)?),
        serde_json::Value::Object(_) => Ok(vec![serde_json::from_value(value)?]),
        serde_json::Value::Null => Err(NormalizeError::UnsupportedShape("null")),
        serde_json::Value::Bool(_) => Err(NormalizeError::UnsupportedShape("a boolean")),
        serde_json::Value::Number(_) => Err(NormalizeError::UnsupportedShape("a number")),
        serde_json::Value::String(_) => Err(NormalizeError::UnsupportedShape("a string")),
    }
}

/// Read and parse a Takeout export file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn read_takeout_file(path: &Path) -> Result<Vec<TakeoutRecord>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse_takeout(&content).with_context(|| format!("failed to parse {}", path.display()))
}

/// Normalize one batch of Takeout records.
#[must_use]
pub fn normalize(records: &[TakeoutRecord], options: &NormalizeOptions) -> NormalizeOutput {
    let mut stats = NormalizeStats {
        records_in: records.len(),
        ..NormalizeStats::default()
    };
    let mut events = Vec::with_capacity(records.len());

    for record in records {
        if record.mentions_ads() {
            stats.dropped_ads += 1;
            continue;
        }

        let Some(url) = record
            .title_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
        else {
            stats.dropped_missing_url += 1;
            continue;
        };
        if url.contains(SEARCH_HOST) {
            stats.dropped_search_urls += 1;
            continue;
        }

        let title = record.title.as_deref().map(fold_music_host).unwrap_or_default();
        let title = title
            .strip_prefix(WATCHED_PREFIX)
            .map(str::to_string)
            .unwrap_or(title);

        let timestamp = record
            .time
            .as_deref()
            .and_then(|raw| parse_takeout_time(raw, options.time_offset));
        if timestamp.is_none() {
            stats.untimed += 1;
        }

        events.push(EventRecord::new(
            fold_music_host(url),
            title,
            timestamp,
            record.header.clone(),
        ));
    }

    if options.newest_first {
        sort_newest_first(&mut events);
    }

    stats.events_out = events.len();
    debug!(
        records = stats.records_in,
        events = stats.events_out,
        dropped_ads = stats.dropped_ads,
        dropped_missing_url = stats.dropped_missing_url,
        dropped_search_urls = stats.dropped_search_urls,
        untimed = stats.untimed,
        "normalized takeout records"
    );
    if stats.untimed > 0 {
        warn!(untimed = stats.untimed, "takeout records with unparseable time");
    }

    NormalizeOutput { events, stats }
}

/// Read, normalize and concatenate several Takeout exports into one batch.
///
/// Sorting (when enabled) happens once over the combined batch.
///
/// # Errors
///
/// Returns an error if any file cannot be read or parsed.
pub fn normalize_files<P: AsRef<Path>>(
    paths: &[P],
    options: &NormalizeOptions,
) -> Result<NormalizeOutput> {
    let per_file = NormalizeOptions {
        newest_first: false,
        ..*options
    };

    let mut combined = NormalizeOutput::default();
    for path in paths {
        let records = read_takeout_file(path.as_ref())?;
        let output = normalize(&records, &per_file);
        combined.stats.absorb(&output.stats);
        combined.events.extend(output.events);
    }

    if options.newest_first {
        sort_newest_first(&mut combined.events);
    }
    Ok(combined)
}

/// Parse the leading `YYYY-MM-DDTHH:MM:SS` of a Takeout time and shift it.
///
/// Sub-second precision and the zone suffix are discarded.
#[must_use]
pub fn parse_takeout_time(raw: &str, offset: TimeDelta) -> Option<Timestamp> {
    let head = raw.get(..TAKEOUT_TIME_LEN)?;
    let parsed = NaiveDateTime::parse_from_str(head, TAKEOUT_TIME_FORMAT).ok()?;
    parsed.checked_add_signed(offset).map(Timestamp::from_naive)
}

fn fold_music_host(value: &str) -> String {
    value.replace("//music.", "//www.")
}

fn sort_newest_first(events: &mut [EventRecord]) {
    // `None` sorts below `Some`, so reversing the comparison puts untimed
    // rows last.
    events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn record(url: Option<&str>, title: &str, time: &str) -> TakeoutRecord {
        TakeoutRecord {
            header: Some("YouTube".into()),
            title: Some(title.into()),
            title_url: url.map(str::to_string),
            time: Some(time.into()),
            ..TakeoutRecord::default()
        }
    }

    fn utc() -> NormalizeOptions {
        NormalizeOptions {
            time_offset: TimeDelta::zero(),
            newest_first: false,
        }
    }

    #[test]
    fn parses_array_and_single_object() {
        let many = parse_takeout(r#"[{"title":"a"},{"title":"b"}]"#).expect("array");
        assert_eq!(many.len(), 2);
        let one = parse_takeout(r#"{"title":"a","products":["YouTube"]}"#).expect("object");
        assert_eq!(one.len(), 1);
    }

    #[test]
    fn rejects_scalar_documents() {
        let err = parse_takeout("42").unwrap_err();
        assert!(matches!(err, NormalizeError::UnsupportedShape("a number")));
        assert_eq!(err.code(), ErrorCode::MalformedTakeoutExport);
    }

    #[test]
    fn applies_default_offset() {
        let ts = parse_takeout_time(
            "2024-01-01T04:30:00.123Z",
            TimeDelta::minutes(DEFAULT_OFFSET_MINUTES),
        )
        .expect("parse");
        assert_eq!(ts.to_string(), "2024-01-01T10:00:00");
    }

    #[test]
    fn offset_can_cross_year_boundary() {
        let ts =
            parse_takeout_time("2023-12-31T20:00:00Z", TimeDelta::minutes(330)).expect("parse");
        assert_eq!(ts.year_suffix(), "24");
    }

    #[test]
    fn offset_beyond_a_day_is_rejected() {
        let ok = NormalizeOptions::with_offset_minutes(-MAX_OFFSET_MINUTES).expect("in range");
        assert_eq!(ok.time_offset, TimeDelta::hours(-24));
        assert!(ok.newest_first);

        for minutes in [MAX_OFFSET_MINUTES + 1, i64::MAX, i64::MIN] {
            let err = NormalizeOptions::with_offset_minutes(minutes).unwrap_err();
            assert!(matches!(err, NormalizeError::OffsetOutOfRange(m) if m == minutes));
            assert_eq!(err.code(), ErrorCode::InvalidTimeOffset);
        }
    }

    #[test]
    fn short_or_bad_time_is_untimed() {
        assert!(parse_takeout_time("2024-01-01", TimeDelta::zero()).is_none());
        assert!(parse_takeout_time("not a time at all!!", TimeDelta::zero()).is_none());
    }

    #[test]
    fn drops_ads_missing_urls_and_search_rows() {
        let mut ad = record(
            Some("https://www.youtube.com/watch?v=ad"),
            "Watched ad",
            "2024-01-01T00:00:00Z",
        );
        ad.details = vec![TakeoutLink {
            name: Some("From Google Ads".into()),
            url: None,
        }];
        let records = vec![
            ad,
            record(None, "Watched nothing", "2024-01-01T00:00:00Z"),
            record(Some("   "), "Watched blank", "2024-01-01T00:00:00Z"),
            record(Some("https://www.google.com/search?q=x"), "Searched", "2024-01-01T00:00:00Z"),
            record(
                Some("https://www.youtube.com/watch?v=ok"),
                "Watched ok",
                "2024-01-01T00:00:00Z",
            ),
        ];

        let out = normalize(&records, &utc());
        assert_eq!(out.events.len(), 1);
        assert_eq!(out.stats.dropped_ads, 1);
        assert_eq!(out.stats.dropped_missing_url, 2);
        assert_eq!(out.stats.dropped_search_urls, 1);
        assert_eq!(out.stats.records_in, 5);
        assert_eq!(out.stats.events_out, 1);
    }

    #[test]
    fn folds_music_host_and_strips_watched_prefix() {
        let records = vec![record(
            Some("https://music.youtube.com/watch?v=abc"),
            "Watched https://music.youtube.com/watch?v=abc",
            "2024-01-01T00:00:00Z",
        )];
        let out = normalize(&records, &utc());
        let event = &out.events[0];
        assert_eq!(event.entity_key, "https://www.youtube.com/watch?v=abc");
        assert_eq!(event.title, "https://www.youtube.com/watch?v=abc");
        assert_eq!(event.category.as_deref(), Some("YouTube"));
    }

    #[test]
    fn bad_time_keeps_row_without_timestamp() {
        let records = vec![record(
            Some("https://www.youtube.com/watch?v=x"),
            "Watched x",
            "garbage",
        )];
        let out = normalize(&records, &utc());
        assert_eq!(out.events.len(), 1);
        assert!(out.events[0].timestamp.is_none());
        assert_eq!(out.stats.untimed, 1);
    }

    #[test]
    fn newest_first_sorts_untimed_last() {
        let records = vec![
            record(Some("https://www.youtube.com/watch?v=a"), "a", "garbage"),
            record(Some("https://www.youtube.com/watch?v=b"), "b", "2023-01-01T00:00:00Z"),
            record(Some("https://www.youtube.com/watch?v=c"), "c", "2024-01-01T00:00:00Z"),
        ];
        let options = NormalizeOptions {
            newest_first: true,
            ..utc()
        };
        let titles: Vec<_> = normalize(&records, &options)
            .events
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(titles, ["c", "b", "a"]);
    }

    #[test]
    fn normalize_files_concatenates_and_counts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = dir.path().join("a-watch-history.json");
        let second = dir.path().join("b-watch-history.json");
        let mut f = fs::File::create(&first).expect("create");
        write!(
            f,
            r#"[{{"header":"YouTube","title":"Watched one","titleUrl":"https://www.youtube.com/watch?v=1","time":"2023-01-01T00:00:00Z"}}]"#
        )
        .expect("write");
        fs::write(
            &second,
            r#"{"header":"YouTube","title":"Watched two","titleUrl":"https://www.youtube.com/watch?v=2","time":"2024-01-01T00:00:00Z"}"#,
        )
        .expect("write");

        let out =
            normalize_files(&[&first, &second], &NormalizeOptions::default()).expect("normalize");
        assert_eq!(out.stats.records_in, 2);
        assert_eq!(out.events[0].title, "two");
        assert_eq!(out.events[1].title, "one");
    }

    #[test]
    fn normalize_files_reports_path_on_bad_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bad = dir.path().join("broken.json");
        fs::write(&bad, "[{").expect("write");
        let err = normalize_files(&[&bad], &NormalizeOptions::default()).unwrap_err();
        assert!(format!("{err:#}").contains("broken.json"));
    }
}
