use std::fmt;

/// Machine-readable error codes surfaced by the library and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    InvalidTimeOffset,
    MalformedEventBatch,
    MalformedTakeoutExport,
    InvalidTimestamp,
    InvalidOccurrenceSet,
    RollupInvariantViolated,
    RollupVersionMismatch,
    RollupDigestMismatch,
    RollupRowInvalid,
    RollupWriteFailed,
    LockContention,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::InvalidTimeOffset => "E1002",
            Self::MalformedEventBatch => "E2001",
            Self::MalformedTakeoutExport => "E2002",
            Self::InvalidTimestamp => "E2003",
            Self::InvalidOccurrenceSet => "E2004",
            Self::RollupInvariantViolated => "E3001",
            Self::RollupVersionMismatch => "E3002",
            Self::RollupDigestMismatch => "E3003",
            Self::RollupRowInvalid => "E3004",
            Self::RollupWriteFailed => "E5001",
            Self::LockContention => "E5002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::InvalidTimeOffset => "Time offset out of range",
            Self::MalformedEventBatch => "Malformed event batch",
            Self::MalformedTakeoutExport => "Malformed Takeout export",
            Self::InvalidTimestamp => "Invalid timestamp",
            Self::InvalidOccurrenceSet => "Invalid occurrence set encoding",
            Self::RollupInvariantViolated => "Rollup invariant violated",
            Self::RollupVersionMismatch => "Unsupported rollup format version",
            Self::RollupDigestMismatch => "Rollup digest mismatch",
            Self::RollupRowInvalid => "Invalid rollup row",
            Self::RollupWriteFailed => "Rollup write failed",
            Self::LockContention => "Lock contention",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .reel/config.toml and retry."),
            Self::InvalidTimeOffset => Some("Use an offset between -1440 and 1440 minutes."),
            Self::MalformedEventBatch => {
                Some("Regenerate the batch with `reel normalize` and retry.")
            }
            Self::MalformedTakeoutExport => {
                Some("Pass the history JSON file from the Takeout archive unchanged.")
            }
            Self::InvalidTimestamp | Self::InvalidOccurrenceSet | Self::RollupRowInvalid => None,
            Self::RollupInvariantViolated => {
                Some("Rebuild the rollup from the full event history with `reel aggregate`.")
            }
            Self::RollupVersionMismatch => Some("Upgrade reel to read this rollup file."),
            Self::RollupDigestMismatch => {
                Some("The rollup was edited by hand or truncated; restore or rebuild it.")
            }
            Self::RollupWriteFailed => Some("Check disk space and write permissions."),
            Self::LockContention => {
                Some("Retry after the other `reel` process releases its lock.")
            }
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
