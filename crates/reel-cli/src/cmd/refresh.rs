use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use reel_core::batch;
use reel_core::normalize::normalize_files;
use tracing::info;

use super::Context;
use super::merge::{merge_into, print_summary};

/// Arguments for `reel refresh`.
#[derive(Args, Debug)]
pub struct RefreshArgs {
    /// Takeout history JSON files.
    #[arg(value_name = "TAKEOUT_JSON", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Rollup to merge into (defaults to the configured rollup path).
    #[arg(long, value_name = "PATH")]
    pub rollup: Option<PathBuf>,

    /// Minutes added to every Takeout UTC time (overrides config).
    #[arg(long, value_name = "N", allow_negative_numbers = true)]
    pub offset_minutes: Option<i64>,

    /// Also keep the normalized batch as JSONL at this path.
    #[arg(long, value_name = "PATH")]
    pub keep_events: Option<PathBuf>,
}

/// Normalize Takeout exports and merge them straight into the rollup.
pub fn run_refresh(args: &RefreshArgs, ctx: &Context) -> Result<()> {
    let inputs: Vec<PathBuf> = args.inputs.iter().map(|p| ctx.resolve(p)).collect();
    let options = ctx.normalize_options(args.offset_minutes)?;
    let normalized = normalize_files(&inputs, &options)?;
    info!(
        files = inputs.len(),
        events = normalized.stats.events_out,
        "normalized takeout exports for refresh"
    );

    if let Some(keep) = args.keep_events.as_deref() {
        batch::write_batch(&ctx.resolve(keep), &normalized.events)?;
    }

    let path = ctx.rollup_path(args.rollup.as_deref());
    let summary = merge_into(&normalized.events, &path, ctx)?;
    print_summary(&summary, ctx)
}
