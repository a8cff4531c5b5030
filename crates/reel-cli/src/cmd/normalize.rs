use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use reel_core::batch;
use reel_core::normalize::{NormalizeStats, normalize_files};
use serde::Serialize;

use super::Context;
use crate::output::{pretty_kv, pretty_section, render_mode};

/// Arguments for `reel normalize`.
#[derive(Args, Debug)]
pub struct NormalizeArgs {
    /// Takeout history JSON files (e.g. `watch-history.json`).
    #[arg(value_name = "TAKEOUT_JSON", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output JSONL path (defaults to stdout).
    #[arg(long, short, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Minutes added to every Takeout UTC time (overrides config).
    #[arg(long, value_name = "N", allow_negative_numbers = true)]
    pub offset_minutes: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct NormalizeSummary {
    pub files: usize,
    pub records_in: usize,
    pub events_out: usize,
    pub dropped_ads: usize,
    pub dropped_missing_url: usize,
    pub dropped_search_urls: usize,
    pub untimed: usize,
    pub output: String,
}

impl NormalizeSummary {
    pub fn new(files: usize, stats: &NormalizeStats, output: String) -> Self {
        Self {
            files,
            records_in: stats.records_in,
            events_out: stats.events_out,
            dropped_ads: stats.dropped_ads,
            dropped_missing_url: stats.dropped_missing_url,
            dropped_search_urls: stats.dropped_search_urls,
            untimed: stats.untimed,
            output,
        }
    }
}

pub fn run_normalize(args: &NormalizeArgs, ctx: &Context) -> Result<()> {
    let inputs: Vec<PathBuf> = args.inputs.iter().map(|p| ctx.resolve(p)).collect();
    let options = ctx.normalize_options(args.offset_minutes)?;
    let normalized = normalize_files(&inputs, &options)?;

    let Some(output) = args.output.as_deref() else {
        // Events go to stdout; keep it clean for piping.
        let stdout = io::stdout();
        let mut out = BufWriter::new(stdout.lock());
        batch::write_events(&mut out, &normalized.events)
            .context("failed to write events to stdout")?;
        return out.flush().context("failed to flush stdout");
    };

    let output = ctx.resolve(output);
    batch::write_batch(&output, &normalized.events)?;

    if !ctx.show_summary() {
        return Ok(());
    }
    let summary = NormalizeSummary::new(
        inputs.len(),
        &normalized.stats,
        output.display().to_string(),
    );
    render_mode(ctx.output, &summary, render_text, render_pretty)
}

pub fn render_text(s: &NormalizeSummary, w: &mut dyn Write) -> io::Result<()> {
    writeln!(
        w,
        "normalized\t{}\t{}\t{}",
        s.records_in, s.events_out, s.output
    )?;
    writeln!(
        w,
        "dropped\tads={}\tmissing_url={}\tsearch={}\tuntimed={}",
        s.dropped_ads, s.dropped_missing_url, s.dropped_search_urls, s.untimed
    )
}

pub fn render_pretty(s: &NormalizeSummary, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, "Normalized Takeout export")?;
    pretty_kv(w, "Files", s.files.to_string())?;
    pretty_kv(w, "Records", s.records_in.to_string())?;
    pretty_kv(w, "Events", s.events_out.to_string())?;
    pretty_kv(w, "Ads dropped", s.dropped_ads.to_string())?;
    pretty_kv(w, "No URL", s.dropped_missing_url.to_string())?;
    pretty_kv(w, "Searches", s.dropped_search_urls.to_string())?;
    pretty_kv(w, "Untimed", s.untimed.to_string())?;
    pretty_kv(w, "Written to", &s.output)
}
