//! Event batches as JSON lines.
//!
//! One [`EventRecord`] per line:
//!
//! ```text
//! {"entity_key":"https://www.youtube.com/watch?v=abc","title":"Song","timestamp":"2024-01-01T10:00:00","category":"YouTube Music"}
//! ```
//!
//! Blank lines are skipped. Anything else that fails to decode aborts the
//! whole read with its line number.

use std::fs;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ErrorCode;
use crate::event::EventRecord;

/// Errors raised while reading or writing an event batch.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("event batch I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed event at line {line}: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("event at line {line} has an empty entity_key")]
    EmptyEntityKey { line: usize },
}

impl BatchError {
    /// Machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Io { .. } => ErrorCode::InternalUnexpected,
            Self::Malformed { .. } | Self::EmptyEntityKey { .. } => ErrorCode::MalformedEventBatch,
        }
    }
}

/// Decode events from any buffered reader.
///
/// # Errors
///
/// Returns [`BatchError`] for the first line that cannot be read or decoded,
/// or that carries an empty `entity_key`.
pub fn read_events<R: BufRead>(reader: R, source: &Path) -> Result<Vec<EventRecord>, BatchError> {
    let mut events = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|source_err| BatchError::Io {
            path: source.to_path_buf(),
            source: source_err,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let event: EventRecord =
            serde_json::from_str(&line).map_err(|source| BatchError::Malformed {
                line: line_no,
                source,
            })?;
        if event.entity_key.is_empty() {
            return Err(BatchError::EmptyEntityKey { line: line_no });
        }
        events.push(event);
    }
    Ok(events)
}

/// Read a JSONL batch from disk.
///
/// # Errors
///
/// See [`read_events`]; also fails if the file cannot be opened.
pub fn read_batch(path: &Path) -> Result<Vec<EventRecord>, BatchError> {
    let file = fs::File::open(path).map_err(|source| BatchError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let events = read_events(BufReader::new(file), path)?;
    debug!(path = %path.display(), events = events.len(), "read event batch");
    Ok(events)
}

/// Encode events as JSON lines into `writer`.
///
/// # Errors
///
/// Returns an I/O error if writing fails.
pub fn write_events<W: Write>(mut writer: W, events: &[EventRecord]) -> io::Result<()> {
    for event in events {
        serde_json::to_writer(&mut writer, event)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}

/// Write a JSONL batch to disk, replacing any existing file.
///
/// # Errors
///
/// Returns [`BatchError::Io`] if the file cannot be created or written.
pub fn write_batch(path: &Path, events: &[EventRecord]) -> Result<(), BatchError> {
    let io_err = |source| BatchError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let file = fs::File::create(path).map_err(io_err)?;
    write_events(BufWriter::new(file), events).map_err(io_err)?;
    debug!(path = %path.display(), events = events.len(), "wrote event batch");
    Ok(())
}
