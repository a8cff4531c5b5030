use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use reel_core::lock::RollupLock;
use reel_core::{aggregate, batch, store};
use serde::Serialize;
use tracing::info;

use super::Context;
use crate::output::{pretty_kv, pretty_section, render_mode};

/// Arguments for `reel aggregate`.
#[derive(Args, Debug)]
pub struct AggregateArgs {
    /// Normalized event batch (JSONL).
    #[arg(long, value_name = "PATH")]
    pub events: PathBuf,

    /// Rollup to write (defaults to the configured rollup path).
    #[arg(long, short, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Leave per-year counts out of the rollup.
    #[arg(long)]
    pub no_year_counts: bool,
}

#[derive(Debug, Serialize)]
struct AggregateSummary {
    events: usize,
    rows: usize,
    occurrences: u64,
    year_counts: bool,
    output: String,
}

/// Rebuild a rollup from one batch, replacing whatever is on disk.
pub fn run_aggregate(args: &AggregateArgs, ctx: &Context) -> Result<()> {
    let events = batch::read_batch(&ctx.resolve(&args.events))?;
    let year_counts = ctx.config.aggregate.year_counts && !args.no_year_counts;
    let rollup = aggregate(&events, year_counts);

    let path = ctx.rollup_path(args.output.as_deref());
    let lock = RollupLock::acquire(&path, ctx.config.store.lock_timeout())?;
    store::save(&path, &rollup)?;
    lock.release();
    info!(path = %path.display(), rows = rollup.len(), "rollup rebuilt from batch");

    if !ctx.show_summary() {
        return Ok(());
    }
    let summary = AggregateSummary {
        events: events.len(),
        rows: rollup.len(),
        occurrences: rollup.total_occurrences(),
        year_counts,
        output: path.display().to_string(),
    };
    render_mode(ctx.output, &summary, render_text, render_pretty)
}

fn render_text(s: &AggregateSummary, w: &mut dyn Write) -> io::Result<()> {
    writeln!(
        w,
        "aggregated\t{}\t{}\t{}\t{}",
        s.events, s.rows, s.occurrences, s.output
    )
}

fn render_pretty(s: &AggregateSummary, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, "Aggregated event batch")?;
    pretty_kv(w, "Events", s.events.to_string())?;
    pretty_kv(w, "Entities", s.rows.to_string())?;
    pretty_kv(w, "Occurrences", s.occurrences.to_string())?;
    pretty_kv(w, "Year counts", if s.year_counts { "yes" } else { "no" })?;
    pretty_kv(w, "Written to", &s.output)
}
