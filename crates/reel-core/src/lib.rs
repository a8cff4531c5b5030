//! reel-core library.
//!
//! Folds a stream of normalized activity events into one summary row per
//! entity, and merges later batches into a persisted rollup without
//! double-counting.
//!
//! ```text
//! Takeout JSON ─► normalize ─► EventRecord batch ─┐
//!                                                 ├─► merge ─► Rollup ─► store
//!                      store ─► prior Rollup ─────┘
//! ```
//!
//! [`aggregate`] and [`merge`] are pure. File access lives in [`batch`],
//! [`normalize`] and [`store`]; cross-process exclusion lives in [`lock`].

pub mod aggregate;
pub mod batch;
pub mod config;
pub mod error;
pub mod event;
pub mod lock;
pub mod merge;
pub mod normalize;
pub mod rollup;
pub mod store;

pub use aggregate::aggregate;
pub use event::{EventRecord, Timestamp};
pub use merge::{MergeMode, MergeOutcome, MergeReport, merge, merge_with_report};
pub use rollup::{Rollup, RollupRow, YearCounts};

/// # Conventions
///
/// - **Errors**: `thiserror` enums at module seams, `anyhow::Result` for
///   file-level helpers.
/// - **Logging**: Use `tracing` macros (`info!`, `warn!`, `debug!`).
pub fn init() {
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "reel-core initialized");
}
