//! Persisted rollup documents.
//!
//! # Format (v1)
//!
//! ```text
//! # reel rollup v1
//! # fields: entity_key \t title \t first_seen \t last_seen \t frequency \t occurrences \t category \t year_counts
//! # digest: blake3:<hex>
//! <one tab-separated line per row, in rollup order>
//! ```
//!
//! - `occurrences` uses the [`codec`](crate::rollup::codec) (`v1:` + sorted
//!   `|`-joined timestamps).
//! - `category` is `-` for none; a literal `-` is written `\-`.
//! - `year_counts` is compact JSON, or `-` when year counting was off.
//! - Backslash, tab, CR and LF inside text fields are escaped.
//! - The digest covers every data line, each terminated by `\n`.
//!
//! Loading re-checks the digest and every row invariant, so a document that
//! loads is one the engine could have produced. Saving writes a sibling
//! `.tmp` file and renames it over the target.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, info};

use crate::error::ErrorCode;
use crate::event::Timestamp;
use crate::rollup::{Rollup, RollupRow, YearCounts, decode_occurrences, encode_occurrences};

/// First line of every rollup document.
pub const ROLLUP_HEADER: &str = "# reel rollup v1";

/// Field comment that follows the header.
pub const FIELD_COMMENT: &str = "# fields: entity_key \\t title \\t first_seen \\t last_seen \\t frequency \\t occurrences \\t category \\t year_counts";

/// Newest document version this build reads and the one it writes.
pub const CURRENT_VERSION: u32 = 1;

const HEADER_PREFIX: &str = "# reel rollup v";
const FIELD_PREFIX: &str = "# fields:";
const DIGEST_PREFIX: &str = "# digest: ";
const FIELD_COUNT: usize = 8;
const NULL_FIELD: &str = "-";

/// Errors raised while reading or writing a rollup document.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("rollup I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The first line is not a rollup header.
    #[error("not a reel rollup: {0}")]
    MalformedHeader(String),

    /// The document was written by a newer reel.
    #[error("rollup format v{found} is newer than this build supports (v{supported})")]
    VersionMismatch { found: u32, supported: u32 },

    /// The data lines do not hash to the recorded digest.
    #[error("rollup digest mismatch: header has '{expected}', data hashes to '{computed}'")]
    DigestMismatch { expected: String, computed: String },

    /// A data line failed to parse or broke a row invariant.
    #[error("invalid rollup row at line {line}: {reason}")]
    InvalidRow { line: usize, reason: String },
}

impl StoreError {
    /// Machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Io { .. } => ErrorCode::RollupWriteFailed,
            Self::MalformedHeader(_) | Self::VersionMismatch { .. } => {
                ErrorCode::RollupVersionMismatch
            }
            Self::DigestMismatch { .. } => ErrorCode::RollupDigestMismatch,
            Self::InvalidRow { .. } => ErrorCode::RollupRowInvalid,
        }
    }

    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Render a rollup as a complete v1 document.
#[must_use]
pub fn render(rollup: &Rollup) -> String {
    let data: Vec<String> = rollup.iter().map(render_row).collect();
    let digest = digest_lines(data.iter().map(String::as_str));

    let mut out = String::with_capacity(data.iter().map(|l| l.len() + 1).sum::<usize>() + 256);
    out.push_str(ROLLUP_HEADER);
    out.push('\n');
    out.push_str(FIELD_COMMENT);
    out.push('\n');
    out.push_str(DIGEST_PREFIX);
    out.push_str(&digest);
    out.push('\n');
    for line in &data {
        out.push_str(line);
        out.push('\n');
    }
    out
}

fn render_row(row: &RollupRow) -> String {
    let category = match row.category.as_deref() {
        None => NULL_FIELD.to_string(),
        Some(NULL_FIELD) => "\\-".to_string(),
        Some(label) => escape(label),
    };
    let years = row.year_counts.as_ref().map_or_else(
        || NULL_FIELD.to_string(),
        |counts| {
            // BTreeMap<String, u64> always serializes.
            serde_json::to_string(counts).unwrap_or_else(|_| NULL_FIELD.to_string())
        },
    );

    [
        escape(&row.entity_key),
        escape(&row.title),
        row.first_seen.to_string(),
        row.last_seen.to_string(),
        row.frequency.to_string(),
        encode_occurrences(&row.occurrences),
        category,
        years,
    ]
    .join("\t")
}

fn digest_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = blake3::Hasher::new();
    for line in lines {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    format!("blake3:{}", hasher.finalize())
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(raw: &str) -> Result<String, String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('-') => out.push('-'),
            Some(other) => return Err(format!("unknown escape '\\{other}' in '{raw}'")),
            None => return Err(format!("dangling backslash in '{raw}'")),
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse the version number out of a header line.
///
/// # Errors
///
/// [`StoreError::MalformedHeader`] for anything that is not a rollup header,
/// [`StoreError::VersionMismatch`] for a version newer than
/// [`CURRENT_VERSION`].
pub fn detect_version(first_line: &str) -> Result<u32, StoreError> {
    let line = first_line.trim();
    let rest = line.strip_prefix(HEADER_PREFIX).ok_or_else(|| {
        StoreError::MalformedHeader(format!("expected '{HEADER_PREFIX}N', got '{line}'"))
    })?;
    let version: u32 = rest
        .parse()
        .map_err(|_| StoreError::MalformedHeader(format!("invalid version number '{rest}'")))?;
    if version > CURRENT_VERSION {
        return Err(StoreError::VersionMismatch {
            found: version,
            supported: CURRENT_VERSION,
        });
    }
    Ok(version)
}

/// Parse a complete document.
///
/// # Errors
///
/// Returns [`StoreError`] if the header, digest, any row, or the table as a
/// whole is invalid.
pub fn parse(text: &str) -> Result<Rollup, StoreError> {
    let mut lines = text.lines().enumerate().map(|(idx, line)| (idx + 1, line));

    let (_, first) = lines
        .next()
        .ok_or_else(|| StoreError::MalformedHeader("document is empty".into()))?;
    detect_version(first)?;

    // The field comment and digest sit at fixed positions; every line after
    // them is data, whatever it starts with.
    match lines.next() {
        Some((_, line)) if line.starts_with(FIELD_PREFIX) => {}
        _ => return Err(StoreError::MalformedHeader("missing field comment".into())),
    }
    let expected = match lines.next() {
        Some((_, line)) => line
            .strip_prefix(DIGEST_PREFIX)
            .map(str::trim)
            .ok_or_else(|| StoreError::MalformedHeader("missing digest line".into()))?,
        None => return Err(StoreError::MalformedHeader("missing digest line".into())),
    };

    let data: Vec<(usize, &str)> = lines.filter(|(_, line)| !line.trim().is_empty()).collect();
    let computed = digest_lines(data.iter().map(|(_, line)| *line));
    if computed != expected {
        return Err(StoreError::DigestMismatch {
            expected: expected.to_string(),
            computed,
        });
    }

    let mut seen = std::collections::HashSet::with_capacity(data.len());
    let mut rows = Vec::with_capacity(data.len());
    for (number, line) in data {
        let row = parse_row(line).map_err(|reason| StoreError::InvalidRow {
            line: number,
            reason,
        })?;
        row.check().map_err(|err| StoreError::InvalidRow {
            line: number,
            reason: err.to_string(),
        })?;
        if !seen.insert(row.entity_key.clone()) {
            return Err(StoreError::InvalidRow {
                line: number,
                reason: format!("duplicate entity key '{}'", row.entity_key),
            });
        }
        rows.push(row);
    }

    Ok(Rollup::new(rows))
}

fn parse_row(line: &str) -> Result<RollupRow, String> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != FIELD_COUNT {
        return Err(format!(
            "expected {FIELD_COUNT} tab-separated fields, found {}",
            fields.len()
        ));
    }

    let timestamp = |raw: &str| Timestamp::parse(raw).map_err(|err| err.to_string());

    let entity_key = unescape(fields[0])?;
    let title = unescape(fields[1])?;
    let first_seen = timestamp(fields[2])?;
    let last_seen = timestamp(fields[3])?;
    let frequency: u64 = fields[4]
        .parse()
        .map_err(|_| format!("invalid frequency '{}'", fields[4]))?;
    let occurrences = decode_occurrences(fields[5]).map_err(|err| err.to_string())?;
    let category = match fields[6] {
        NULL_FIELD => None,
        raw => Some(unescape(raw)?),
    };
    let year_counts = match fields[7] {
        NULL_FIELD => None,
        raw => Some(
            serde_json::from_str::<YearCounts>(raw)
                .map_err(|err| format!("invalid year_counts '{raw}': {err}"))?,
        ),
    };

    Ok(RollupRow {
        entity_key,
        title,
        first_seen,
        last_seen,
        frequency,
        occurrences,
        category,
        year_counts,
    })
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// Load a rollup document. A missing file is `Ok(None)`.
///
/// # Errors
///
/// Returns [`StoreError`] if the file exists but cannot be read or is
/// invalid.
pub fn load(path: &Path) -> Result<Option<Rollup>, StoreError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no rollup on disk");
            return Ok(None);
        }
        Err(err) => return Err(StoreError::io(path, err)),
    };
    let rollup = parse(&text)?;
    debug!(path = %path.display(), rows = rollup.len(), "loaded rollup");
    Ok(Some(rollup))
}

/// Write `rollup` to `path` by way of `<path>.tmp` and a rename.
///
/// # Errors
///
/// Returns [`StoreError::Io`] if the directory, temp file or rename fails.
pub fn save(path: &Path, rollup: &Rollup) -> Result<(), StoreError> {
    write_atomically(path, render(rollup).as_bytes())?;
    info!(path = %path.display(), rows = rollup.len(), "saved rollup");
    Ok(())
}

/// Serialize a rollup as a pretty JSON array of row objects.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_json(rollup: &Rollup) -> serde_json::Result<String> {
    serde_json::to_string_pretty(rollup)
}

/// Write the JSON form of `rollup` to `path`.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn export_json(path: &Path, rollup: &Rollup) -> anyhow::Result<()> {
    let body = to_json(rollup).context("failed to serialize rollup")?;
    write_atomically(path, body.as_bytes())
        .with_context(|| format!("failed to export rollup to {}", path.display()))?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut raw = path.as_os_str().to_owned();
    raw.push(".tmp");
    PathBuf::from(raw)
}

fn write_atomically(path: &Path, body: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| StoreError::io(parent, err))?;
    }
    let tmp = tmp_path_for(path);
    fs::write(&tmp, body).map_err(|err| StoreError::io(&tmp, err))?;
    fs::rename(&tmp, path).map_err(|err| StoreError::io(path, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn ts(raw: &str) -> Timestamp {
        Timestamp::parse(raw).expect("valid timestamp")
    }

    fn row(
        key: &str,
        title: &str,
        times: &[&str],
        category: Option<&str>,
        years: bool,
    ) -> RollupRow {
        let occurrences: BTreeSet<_> = times.iter().map(|raw| ts(raw)).collect();
        let counts = years.then(|| crate::aggregate::year_counts_from_occurrences(&occurrences));
        RollupRow::from_occurrences(key, title, occurrences, category.map(str::to_string), counts)
            .expect("non-empty")
    }

    fn sample() -> Rollup {
        Rollup::new(vec![
            row(
                "E1",
                "T1",
                &["2024-01-01T10:00:00", "2024-01-02T10:00:00"],
                None,
                true,
            ),
            row("E2", "T2", &["2023-06-01T00:00:00"], Some("Music"), true),
        ])
    }

    fn data_lines(doc: &str) -> Vec<&str> {
        doc.lines().skip(3).collect()
    }

    #[test]
    fn render_starts_with_header_and_digest() {
        let doc = render(&sample());
        let mut lines = doc.lines();
        assert_eq!(lines.next(), Some(ROLLUP_HEADER));
        assert_eq!(lines.next(), Some(FIELD_COMMENT));
        assert!(lines.next().is_some_and(|l| l.starts_with("# digest: blake3:")));
        assert_eq!(data_lines(&doc).len(), 2);
    }

    #[test]
    fn render_row_layout() {
        let doc = render(&sample());
        let fields: Vec<&str> = data_lines(&doc)[0].split('\t').collect();
        assert_eq!(
            fields,
            [
                "E1",
                "T1",
                "2024-01-01T10:00:00",
                "2024-01-02T10:00:00",
                "2",
                "v1:2024-01-01T10:00:00|2024-01-02T10:00:00",
                "-",
                r#"{"24":2}"#,
            ]
        );
    }

    #[test]
    fn parse_restores_rendered_rollup() {
        let original = sample();
        assert_eq!(parse(&render(&original)).expect("parse"), original);
    }

    #[test]
    fn awkward_text_survives() {
        let original = Rollup::new(vec![
            row("tab\tkey", "line\nbreak \\ slash\r", &["2024-01-01T00:00:00"], Some("-"), false),
            row("dash", "-", &["2023-01-01T00:00:00"], Some("a\\-b"), false),
        ]);
        let doc = render(&original);
        assert_eq!(data_lines(&doc).len(), 2);
        let back = parse(&doc).expect("parse");
        assert_eq!(back, original);
        assert_eq!(back.rows()[0].category.as_deref(), Some("-"));
        assert!(back.rows()[0].year_counts.is_none());
    }

    #[test]
    fn hash_prefixed_key_on_top_row_survives() {
        let original = Rollup::new(vec![
            row("#anchor", "Top", &["2024-01-01T00:00:00"], None, true),
            row("# digest: x", "Next", &["2023-01-01T00:00:00"], None, true),
        ]);
        let doc = render(&original);
        assert_eq!(data_lines(&doc)[0].split('\t').next(), Some("#anchor"));
        assert_eq!(parse(&doc).expect("parse"), original);
    }

    #[test]
    fn missing_field_comment_is_malformed() {
        let doc = render(&sample()).replacen(&format!("{FIELD_COMMENT}\n"), "", 1);
        assert!(matches!(parse(&doc).unwrap_err(), StoreError::MalformedHeader(_)));
    }

    #[test]
    fn empty_rollup_is_a_valid_document() {
        let doc = render(&Rollup::empty());
        assert!(parse(&doc).expect("parse").is_empty());
    }

    #[test]
    fn newer_version_is_rejected() {
        let doc = render(&sample()).replacen("v1", "v2", 1);
        let err = parse(&doc).unwrap_err();
        assert!(matches!(err, StoreError::VersionMismatch { found: 2, supported: 1 }));
        assert_eq!(err.code(), ErrorCode::RollupVersionMismatch);
    }

    #[test]
    fn foreign_header_is_rejected() {
        let err = parse("# some other log v1\n").unwrap_err();
        assert!(matches!(err, StoreError::MalformedHeader(_)));
        assert!(matches!(parse("").unwrap_err(), StoreError::MalformedHeader(_)));
    }

    #[test]
    fn edited_data_fails_digest() {
        let doc = render(&sample()).replace("\tT1\t", "\tT1 edited\t");
        let err = parse(&doc).unwrap_err();
        assert!(matches!(err, StoreError::DigestMismatch { .. }));
        assert_eq!(err.code(), ErrorCode::RollupDigestMismatch);
    }

    #[test]
    fn missing_digest_is_malformed() {
        let doc: String = render(&sample())
            .lines()
            .filter(|l| !l.starts_with(DIGEST_PREFIX))
            .map(|l| format!("{l}\n"))
            .collect();
        assert!(matches!(parse(&doc).unwrap_err(), StoreError::MalformedHeader(_)));
    }

    /// Build a document around hand-written data lines with a correct digest.
    fn document(data: &[&str]) -> String {
        let mut doc = format!(
            "{ROLLUP_HEADER}\n{FIELD_COMMENT}\n{DIGEST_PREFIX}{}\n",
            digest_lines(data.iter().copied())
        );
        for line in data {
            doc.push_str(line);
            doc.push('\n');
        }
        doc
    }

    #[test]
    fn invariant_breach_reports_line_number() {
        let doc = document(&[
            "E1\tT1\t2024-01-01T00:00:00\t2024-01-01T00:00:00\t1\tv1:2024-01-01T00:00:00\t-\t-",
            "E2\tT2\t2024-01-01T00:00:00\t2024-01-02T00:00:00\t5\tv1:2024-01-01T00:00:00|2024-01-02T00:00:00\t-\t-",
        ]);
        match parse(&doc).unwrap_err() {
            StoreError::InvalidRow { line, reason } => {
                assert_eq!(line, 5);
                assert!(reason.contains("frequency 5"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn wrong_field_count_is_invalid_row() {
        let doc = document(&["E1\tT1\t2024-01-01T00:00:00"]);
        let err = parse(&doc).unwrap_err();
        assert!(matches!(err, StoreError::InvalidRow { line: 4, .. }));
        assert_eq!(err.code(), ErrorCode::RollupRowInvalid);
    }

    #[test]
    fn duplicate_entity_is_invalid_row() {
        let line =
            "E1\tT1\t2024-01-01T00:00:00\t2024-01-01T00:00:00\t1\tv1:2024-01-01T00:00:00\t-\t-";
        let doc = document(&[line, line]);
        match parse(&doc).unwrap_err() {
            StoreError::InvalidRow { line, reason } => {
                assert_eq!(line, 5);
                assert!(reason.contains("duplicate"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn bad_escape_is_invalid_row() {
        let doc = document(&[
            "E\\q1\tT1\t2024-01-01T00:00:00\t2024-01-01T00:00:00\t1\tv1:2024-01-01T00:00:00\t-\t-",
        ]);
        assert!(matches!(parse(&doc).unwrap_err(), StoreError::InvalidRow { .. }));
    }

    #[test]
    fn load_missing_file_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(load(&dir.path().join("absent.tsv")).expect("load").is_none());
    }

    #[test]
    fn save_then_load_and_no_tmp_left_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/rollup.tsv");
        save(&path, &sample()).expect("save");
        assert!(!tmp_path_for(&path).exists());
        assert_eq!(load(&path).expect("load"), Some(sample()));
    }

    #[test]
    fn save_replaces_previous_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("rollup.tsv");
        save(&path, &sample()).expect("save");
        save(&path, &Rollup::empty()).expect("save");
        assert_eq!(load(&path).expect("load"), Some(Rollup::empty()));
    }

    #[test]
    fn export_json_writes_row_array() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("rollup.json");
        export_json(&path, &sample()).expect("export");
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("json");
        assert_eq!(value[0]["entity_key"], "E1");
        assert_eq!(value[0]["frequency"], 2);
        assert_eq!(value[1]["category"], "Music");
    }
}
