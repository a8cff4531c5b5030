use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use reel_core::store;

use super::{Context, load_existing};

/// Arguments for `reel export`.
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Rollup to read (defaults to the configured rollup path).
    #[arg(long, value_name = "PATH")]
    pub rollup: Option<PathBuf>,

    /// Output JSON path (defaults to stdout).
    #[arg(long, short, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

/// Write the rollup as a JSON array of row objects.
pub fn run_export(args: &ExportArgs, ctx: &Context) -> Result<()> {
    let path = ctx.rollup_path(args.rollup.as_deref());
    let rollup = load_existing(&path)?;

    match args.output.as_deref() {
        Some(output) => {
            let output = ctx.resolve(output);
            store::export_json(&output, &rollup)?;
            if ctx.show_summary() && !ctx.output.is_json() {
                eprintln!("exported {} rows to {}", rollup.len(), output.display());
            }
        }
        None => {
            let body = store::to_json(&rollup).context("failed to serialize rollup")?;
            let stdout = io::stdout();
            let mut out = stdout.lock();
            writeln!(out, "{body}")?;
        }
    }
    Ok(())
}
