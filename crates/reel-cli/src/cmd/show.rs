use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use reel_core::RollupRow;
use serde::Serialize;

use super::{Context, load_existing};
use crate::output::{pretty_rule, render_mode};

/// Arguments for `reel show`.
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Rollup to read (defaults to the configured rollup path).
    #[arg(long, value_name = "PATH")]
    pub rollup: Option<PathBuf>,

    /// Show at most this many rows.
    #[arg(long, short = 'n', value_name = "N")]
    pub limit: Option<usize>,

    /// Show only rows whose entity key or title contains this text.
    #[arg(long, value_name = "TEXT")]
    pub filter: Option<String>,
}

#[derive(Debug, Serialize)]
struct ShowView<'a> {
    total: usize,
    rows: Vec<&'a RollupRow>,
}

const TITLE_WIDTH: usize = 40;

pub fn run_show(args: &ShowArgs, ctx: &Context) -> Result<()> {
    let path = ctx.rollup_path(args.rollup.as_deref());
    let rollup = load_existing(&path)?;

    let needle = args.filter.as_deref().map(str::to_lowercase);
    let rows: Vec<&RollupRow> = rollup
        .iter()
        .filter(|row| {
            needle.as_deref().is_none_or(|needle| {
                row.entity_key.to_lowercase().contains(needle)
                    || row.title.to_lowercase().contains(needle)
            })
        })
        .take(args.limit.unwrap_or(usize::MAX))
        .collect();

    let view = ShowView {
        total: rollup.len(),
        rows,
    };
    render_mode(ctx.output, &view, render_text, render_pretty)
}

fn years_text(row: &RollupRow) -> String {
    row.year_counts.as_ref().map_or_else(
        || "-".to_string(),
        |counts| {
            counts
                .iter()
                .map(|(year, n)| format!("'{year}:{n}"))
                .collect::<Vec<_>>()
                .join(" ")
        },
    )
}

fn render_text(view: &ShowView<'_>, w: &mut dyn Write) -> io::Result<()> {
    writeln!(
        w,
        "entity_key\ttitle\tfrequency\tfirst_seen\tlast_seen\tcategory\tyears"
    )?;
    for row in &view.rows {
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            row.entity_key,
            row.title,
            row.frequency,
            row.first_seen,
            row.last_seen,
            row.category.as_deref().unwrap_or("-"),
            years_text(row)
        )?;
    }
    Ok(())
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut out: String = text.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn render_pretty(view: &ShowView<'_>, w: &mut dyn Write) -> io::Result<()> {
    writeln!(
        w,
        "{:<width$}  {:>5}  {:<19}  {:<19}  {}",
        "TITLE",
        "SEEN",
        "FIRST",
        "LAST",
        "CATEGORY",
        width = TITLE_WIDTH
    )?;
    pretty_rule(w)?;
    for row in &view.rows {
        writeln!(
            w,
            "{:<width$}  {:>5}  {:<19}  {:<19}  {}",
            truncate(&row.title, TITLE_WIDTH),
            row.frequency,
            row.first_seen.to_string(),
            row.last_seen.to_string(),
            row.category.as_deref().unwrap_or("-"),
            width = TITLE_WIDTH
        )?;
        if row.year_counts.is_some() {
            writeln!(w, "{:<width$}  {}", "", years_text(row), width = TITLE_WIDTH)?;
        }
    }
    pretty_rule(w)?;
    writeln!(w, "{} of {} entities", view.rows.len(), view.total)
}
