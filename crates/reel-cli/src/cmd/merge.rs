use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::Args;
use reel_core::lock::RollupLock;
use reel_core::{EventRecord, batch, merge_with_report, store};
use serde::Serialize;

use super::Context;
use crate::output::{pretty_kv, pretty_section, render_mode};

/// Arguments for `reel merge`.
#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Normalized event batch (JSONL).
    #[arg(long, value_name = "PATH")]
    pub events: PathBuf,

    /// Rollup to merge into (defaults to the configured rollup path).
    #[arg(long, value_name = "PATH")]
    pub rollup: Option<PathBuf>,
}

/// What a merge did, as reported to the user.
#[derive(Debug, Serialize)]
pub struct MergeSummary {
    pub outcome: &'static str,
    pub mode: &'static str,
    pub events_in: usize,
    pub delta_events: usize,
    pub suppressed: usize,
    pub untimed: usize,
    pub category_overrides: usize,
    pub new_entities: usize,
    pub rows: usize,
    pub written: bool,
    pub rollup: String,
    pub elapsed_ms: u128,
}

pub fn run_merge(args: &MergeArgs, ctx: &Context) -> Result<()> {
    let events = batch::read_batch(&ctx.resolve(&args.events))?;
    let path = ctx.rollup_path(args.rollup.as_deref());
    let summary = merge_into(&events, &path, ctx)?;
    print_summary(&summary, ctx)
}

/// Load → merge → save under the rollup lock. The save is skipped when the
/// batch adds nothing.
pub fn merge_into(events: &[EventRecord], path: &Path, ctx: &Context) -> Result<MergeSummary> {
    let _lock = RollupLock::acquire(path, ctx.config.store.lock_timeout())?;

    let prior = store::load(path)
        .with_context(|| format!("failed to load rollup {}", path.display()))?;
    let (outcome, report) = merge_with_report(events, prior.as_ref());

    let written = outcome.needs_write();
    if written {
        store::save(path, outcome.rollup())?;
    }

    Ok(MergeSummary {
        outcome: outcome.label(),
        mode: report.mode.as_str(),
        events_in: report.events_in,
        delta_events: report.delta_events,
        suppressed: report.suppressed,
        untimed: report.untimed,
        category_overrides: report.category_overrides,
        new_entities: report.new_entities,
        rows: report.rows_out,
        written,
        rollup: path.display().to_string(),
        elapsed_ms: report.elapsed.as_millis(),
    })
}

pub fn print_summary(summary: &MergeSummary, ctx: &Context) -> Result<()> {
    if !ctx.show_summary() {
        return Ok(());
    }
    render_mode(ctx.output, summary, render_text, render_pretty)
}

fn render_text(s: &MergeSummary, w: &mut dyn Write) -> io::Result<()> {
    writeln!(
        w,
        "{}\t{}\tdelta={}\tsuppressed={}\tnew={}\trows={}",
        s.outcome, s.mode, s.delta_events, s.suppressed, s.new_entities, s.rows
    )
}

fn render_pretty(s: &MergeSummary, w: &mut dyn Write) -> io::Result<()> {
    let heading = match s.outcome {
        "no_new_data" => "No new data; rollup unchanged",
        "fresh" => "Built new rollup",
        _ => "Updated rollup",
    };
    pretty_section(w, heading)?;
    pretty_kv(w, "Mode", s.mode)?;
    pretty_kv(w, "Batch events", s.events_in.to_string())?;
    pretty_kv(w, "New events", s.delta_events.to_string())?;
    pretty_kv(w, "Already seen", s.suppressed.to_string())?;
    pretty_kv(w, "Untimed", s.untimed.to_string())?;
    pretty_kv(w, "Pinned categ.", s.category_overrides.to_string())?;
    pretty_kv(w, "New entities", s.new_entities.to_string())?;
    pretty_kv(w, "Rows", s.rows.to_string())?;
    pretty_kv(w, "Rollup", &s.rollup)?;
    pretty_kv(w, "Elapsed", format!("{} ms", s.elapsed_ms))
}
