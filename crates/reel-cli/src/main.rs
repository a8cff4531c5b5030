#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{CommandFactory, Parser, Subcommand};
use output::OutputMode;
use reel_core::config;
use std::env;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "reel: incremental rollups over activity history",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Output format.
    #[arg(long, global = true, value_enum, value_name = "FORMAT")]
    format: Option<OutputMode>,

    /// Suppress non-essential output.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Explicit output format from flags, if any. `--format` wins over `--json`.
    fn format_flag(&self) -> Option<&'static str> {
        self.format
            .map(OutputMode::as_str)
            .or_else(|| self.json.then_some("json"))
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Ingest",
        about = "Normalize Takeout history into an event batch",
        long_about = "Read Google Takeout history JSON, drop ads and unkeyable rows, and write one JSON event per line.",
        after_help = "EXAMPLES:\n    # Normalize to a file\n    reel normalize watch-history.json --output events.jsonl\n\n    # Keep times in UTC\n    reel normalize watch-history.json --offset-minutes 0 > events.jsonl"
    )]
    Normalize(cmd::normalize::NormalizeArgs),

    #[command(
        next_help_heading = "Rollup",
        about = "Rebuild a rollup from one event batch",
        long_about = "Aggregate an event batch into a fresh rollup, replacing any rollup on disk.",
        after_help = "EXAMPLES:\n    # Aggregate into the configured rollup\n    reel aggregate --events events.jsonl\n\n    # Skip per-year counts\n    reel aggregate --events events.jsonl --no-year-counts"
    )]
    Aggregate(cmd::aggregate::AggregateArgs),

    #[command(
        next_help_heading = "Rollup",
        about = "Merge an event batch into the rollup",
        long_about = "Fold only unseen occurrences from an event batch into the persisted rollup. Replayed batches leave the rollup untouched.",
        after_help = "EXAMPLES:\n    # Merge a new batch\n    reel merge --events events.jsonl\n\n    # Emit machine-readable output\n    reel merge --events events.jsonl --json"
    )]
    Merge(cmd::merge::MergeArgs),

    #[command(
        next_help_heading = "Rollup",
        about = "Normalize Takeout history and merge it in one step",
        after_help = "EXAMPLES:\n    # Refresh from a new Takeout export\n    reel refresh Takeout/YouTube/history/watch-history.json"
    )]
    Refresh(cmd::refresh::RefreshArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show rollup rows",
        after_help = "EXAMPLES:\n    # Most recently discovered entities first\n    reel show --limit 20\n\n    # Search titles\n    reel show --filter lofi"
    )]
    Show(cmd::show::ShowArgs),

    #[command(
        next_help_heading = "Read",
        about = "Export the rollup as JSON",
        after_help = "EXAMPLES:\n    # Export to a file\n    reel export --output rollup.json"
    )]
    Export(cmd::export::ExportArgs),

    #[command(
        next_help_heading = "Maintenance",
        about = "Verify rollup integrity",
        long_about = "Check the rollup header, digest and every row invariant.",
        after_help = "EXAMPLES:\n    # Verify the configured rollup\n    reel verify\n\n    # Emit machine-readable output\n    reel verify --json"
    )]
    Verify(cmd::verify::VerifyArgs),

    #[command(
        next_help_heading = "Maintenance",
        about = "Generate shell completion scripts",
        after_help = "EXAMPLES:\n    # Generate bash completions\n    reel completions bash"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn default_filter(verbose: bool, quiet: bool) -> &'static str {
    if verbose || env::var("DEBUG").is_ok() {
        "reel=debug,info"
    } else if quiet {
        "warn"
    } else {
        "reel=info,warn"
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let filter = EnvFilter::try_from_env("REEL_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose, quiet)));

    let format = env::var("REEL_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    reel_core::init();

    // Until config resolves, only the flags say how to render a failure.
    let early_output = OutputMode::from_resolved(cli.format_flag().unwrap_or("text"));
    let project_root = env::current_dir()?;
    let effective = config::resolve_config(&project_root, cli.format_flag())
        .inspect_err(|err| report_coded(early_output, err))?;
    debug!(output = %effective.resolved_output, "resolved output mode");

    let ctx = cmd::Context {
        project_root,
        config: effective.project,
        output: OutputMode::from_resolved(&effective.resolved_output),
        quiet: cli.quiet,
    };

    let result = match cli.command {
        Commands::Normalize(ref args) => cmd::normalize::run_normalize(args, &ctx),
        Commands::Aggregate(ref args) => cmd::aggregate::run_aggregate(args, &ctx),
        Commands::Merge(ref args) => cmd::merge::run_merge(args, &ctx),
        Commands::Refresh(ref args) => cmd::refresh::run_refresh(args, &ctx),
        Commands::Show(ref args) => cmd::show::run_show(args, &ctx),
        Commands::Export(ref args) => cmd::export::run_export(args, &ctx),
        Commands::Verify(ref args) => cmd::verify::run_verify(args, &ctx),
        Commands::Completions(args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)
        }
    };
    result.inspect_err(|err| report_coded(ctx.output, err))
}

/// Render a coded library failure before `main` returns it.
fn report_coded(mode: OutputMode, err: &anyhow::Error) {
    let Some(coded) = output::coded_error(err) else {
        return;
    };
    if let Err(render_err) = output::render_error(mode, &coded) {
        debug!(error = %render_err, "failed to render error");
    }
}
