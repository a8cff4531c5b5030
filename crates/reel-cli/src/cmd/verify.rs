use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use reel_core::store;
use serde::Serialize;

use super::Context;
use crate::output::{CliError, pretty_kv, pretty_section, render_error, render_mode};

/// Arguments for `reel verify`.
#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Rollup to check (defaults to the configured rollup path).
    #[arg(long, value_name = "PATH")]
    pub rollup: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct VerifyReport {
    ok: bool,
    rollup: String,
    rows: usize,
    occurrences: u64,
}

/// Load the rollup (header, digest, rows) and re-check table invariants.
pub fn run_verify(args: &VerifyArgs, ctx: &Context) -> Result<()> {
    let path = ctx.rollup_path(args.rollup.as_deref());

    let rollup = match store::load(&path) {
        Ok(Some(rollup)) => rollup,
        Ok(None) => {
            render_error(
                ctx.output,
                &CliError {
                    message: format!("no rollup at {}", path.display()),
                    suggestion: Some("Build one with `reel merge` or `reel refresh`.".into()),
                    error_code: None,
                },
            )?;
            anyhow::bail!("verify: failed");
        }
        Err(err) => {
            render_error(ctx.output, &CliError::coded(err.to_string(), err.code()))?;
            anyhow::bail!("verify: failed");
        }
    };

    if let Err(err) = rollup.check_invariants() {
        render_error(ctx.output, &CliError::coded(err.to_string(), err.code()))?;
        anyhow::bail!("verify: failed");
    }

    let report = VerifyReport {
        ok: true,
        rollup: path.display().to_string(),
        rows: rollup.len(),
        occurrences: rollup.total_occurrences(),
    };
    render_mode(ctx.output, &report, render_text, render_pretty)
}

fn render_text(r: &VerifyReport, w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "OK\t{}\trows={}\toccurrences={}", r.rollup, r.rows, r.occurrences)
}

fn render_pretty(r: &VerifyReport, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, "verify: success")?;
    pretty_kv(w, "Rollup", &r.rollup)?;
    pretty_kv(w, "Rows", r.rows.to_string())?;
    pretty_kv(w, "Occurrences", r.occurrences.to_string())
}
