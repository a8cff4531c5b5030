pub mod aggregate;
pub mod completions;
pub mod export;
pub mod merge;
pub mod normalize;
pub mod refresh;
pub mod show;
pub mod verify;

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use reel_core::config::ProjectConfig;
use reel_core::normalize::NormalizeOptions;
use reel_core::{Rollup, store};

use crate::output::OutputMode;

/// Per-invocation state shared by every command handler.
#[derive(Debug)]
pub struct Context {
    pub project_root: PathBuf,
    pub config: ProjectConfig,
    pub output: OutputMode,
    pub quiet: bool,
}

impl Context {
    /// Rollup path from `--rollup`, else the configured one, relative to the
    /// project root.
    pub fn rollup_path(&self, flag: Option<&Path>) -> PathBuf {
        let path = flag.unwrap_or(self.config.store.rollup_path.as_path());
        self.project_root.join(path)
    }

    /// Normalizer options with an optional `--offset-minutes` override.
    pub fn normalize_options(&self, offset_minutes: Option<i64>) -> Result<NormalizeOptions> {
        let options = match offset_minutes {
            Some(minutes) => NormalizeOptions::with_offset_minutes(minutes)?,
            None => self.config.normalize.options()?,
        };
        Ok(options)
    }

    /// Resolve a user-supplied path against the project root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.project_root.join(path)
    }

    /// Whether a summary should be printed for a command that wrote files.
    pub const fn show_summary(&self) -> bool {
        !self.quiet || self.output.is_json()
    }
}

/// Load a rollup that must exist.
pub fn load_existing(path: &Path) -> Result<Rollup> {
    store::load(path)
        .with_context(|| format!("failed to load rollup {}", path.display()))?
        .with_context(|| {
            format!(
                "no rollup at {}; run `reel merge` or `reel refresh` first",
                path.display()
            )
        })
}
