use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ErrorCode;
use crate::normalize::{DEFAULT_OFFSET_MINUTES, NormalizeError, NormalizeOptions};

/// A config file exists but does not parse.
#[derive(Debug, thiserror::Error)]
#[error("failed to parse {path}: {source}")]
pub struct ConfigError {
    pub path: PathBuf,
    #[source]
    pub source: toml::de::Error,
}

impl ConfigError {
    /// Machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::ConfigParseError
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub normalize: NormalizeConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub aggregate: AggregateConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeConfig {
    #[serde(default = "default_offset_minutes")]
    pub offset_minutes: i64,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            offset_minutes: default_offset_minutes(),
        }
    }
}

impl NormalizeConfig {
    /// Normalizer options for the configured offset.
    ///
    /// # Errors
    ///
    /// [`NormalizeError::OffsetOutOfRange`] for an offset beyond a day.
    pub fn options(&self) -> Result<NormalizeOptions, NormalizeError> {
        NormalizeOptions::with_offset_minutes(self.offset_minutes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_rollup_path")]
    pub rollup_path: PathBuf,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            rollup_path: default_rollup_path(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateConfig {
    #[serde(default = "default_true")]
    pub year_counts: bool,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            year_counts: default_true(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: ProjectConfig,
    pub user: UserConfig,
    pub resolved_output: String,
}

/// Load `.reel/config.toml` under `project_root`, or defaults if absent.
pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = project_root.join(".reel/config.toml");
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    Ok(parse_toml(&path, &content)?)
}

pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };
    load_user_config_from(&config_dir.join("reel/config.toml"))
}

fn load_user_config_from(path: &Path) -> Result<UserConfig> {
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    Ok(parse_toml(path, &content)?)
}

fn parse_toml<T>(path: &Path, content: &str) -> Result<T, ConfigError>
where
    T: serde::de::DeserializeOwned,
{
    toml::from_str(content).map_err(|source| ConfigError {
        path: path.to_path_buf(),
        source,
    })
}

pub fn resolve_config(project_root: &Path, cli_format: Option<&str>) -> Result<EffectiveConfig> {
    let project = load_project_config(project_root)?;
    let user = load_user_config()?;

    let env_format = env::var("FORMAT").ok();
    let resolved_output = resolve_output(cli_format, user.output.as_deref(), env_format.as_deref());

    Ok(EffectiveConfig {
        project,
        user,
        resolved_output,
    })
}

fn normalize_output_mode(raw: &str) -> Option<&'static str> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "pretty" | "human" => Some("pretty"),
        "text" | "table" | "tsv" => Some("text"),
        "json" => Some("json"),
        _ => None,
    }
}

/// CLI flag, then `FORMAT`, then user config, then TTY detection.
/// Unrecognized values at any level fall through to the next.
fn resolve_output(
    cli_format: Option<&str>,
    user_output: Option<&str>,
    env_format: Option<&str>,
) -> String {
    [cli_format, env_format, user_output]
        .into_iter()
        .flatten()
        .find_map(normalize_output_mode)
        .unwrap_or_else(|| {
            if std::io::stdout().is_terminal() {
                "pretty"
            } else {
                "text"
            }
        })
        .to_string()
}

const fn default_true() -> bool {
    true
}

const fn default_offset_minutes() -> i64 {
    DEFAULT_OFFSET_MINUTES
}

fn default_rollup_path() -> PathBuf {
    PathBuf::from("reel-rollup.tsv")
}

const fn default_lock_timeout_ms() -> u64 {
    5_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn missing_project_config_uses_defaults() {
        let root = tempfile::tempdir().expect("temp dir must be created");
        let cfg = load_project_config(root.path()).expect("load should succeed");
        assert_eq!(cfg.normalize.offset_minutes, 330);
        assert_eq!(cfg.store.rollup_path, PathBuf::from("reel-rollup.tsv"));
        assert_eq!(cfg.store.lock_timeout(), Duration::from_secs(5));
        assert!(cfg.aggregate.year_counts);
    }

    #[test]
    fn partial_project_config_keeps_other_defaults() {
        let root = tempfile::tempdir().expect("temp dir must be created");
        std::fs::create_dir_all(root.path().join(".reel")).expect("create .reel");
        std::fs::write(
            root.path().join(".reel/config.toml"),
            "[normalize]\noffset_minutes = 0\n\n[aggregate]\nyear_counts = false\n",
        )
        .expect("write config");

        let cfg = load_project_config(root.path()).expect("load should succeed");
        assert_eq!(cfg.normalize.offset_minutes, 0);
        assert_eq!(cfg.normalize.options().expect("offset").time_offset, TimeDelta::zero());
        assert!(!cfg.aggregate.year_counts);
        assert_eq!(cfg.store, StoreConfig::default());
    }

    #[test]
    fn malformed_project_config_names_the_file() {
        let root = tempfile::tempdir().expect("temp dir must be created");
        std::fs::create_dir_all(root.path().join(".reel")).expect("create .reel");
        std::fs::write(root.path().join(".reel/config.toml"), "[store\n").expect("write");

        let err = load_project_config(root.path()).unwrap_err();
        assert!(err.to_string().contains("config.toml"));
        let parse = err.downcast_ref::<ConfigError>().expect("typed parse error");
        assert_eq!(parse.code(), ErrorCode::ConfigParseError);
    }

    #[test]
    fn out_of_range_offset_fails_instead_of_panicking() {
        let root = tempfile::tempdir().expect("temp dir must be created");
        std::fs::create_dir_all(root.path().join(".reel")).expect("create .reel");
        std::fs::write(
            root.path().join(".reel/config.toml"),
            "[normalize]\noffset_minutes = 9223372036854775807\n",
        )
        .expect("write config");

        let cfg = load_project_config(root.path()).expect("load should succeed");
        let err = cfg.normalize.options().unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidTimeOffset);
    }

    #[test]
    fn user_config_reads_output() {
        let dir = tempfile::tempdir().expect("temp dir must be created");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "output = \"json\"\n").expect("write config");

        let cfg = load_user_config_from(&path).expect("parse");
        assert_eq!(cfg.output.as_deref(), Some("json"));
        assert!(load_user_config_from(&dir.path().join("absent.toml"))
            .expect("absent is fine")
            .output
            .is_none());
    }

    #[test]
    fn cli_format_overrides_env_and_config() {
        assert_eq!(resolve_output(Some("json"), Some("pretty"), Some("text")), "json");
    }

    #[test]
    fn env_beats_user_config() {
        assert_eq!(resolve_output(None, Some("json"), Some("text")), "text");
    }

    #[test]
    fn aliases_are_normalized() {
        assert_eq!(resolve_output(None, Some("table"), Some("human")), "pretty");
        assert_eq!(resolve_output(None, Some("human"), Some("table")), "text");
    }

    #[test]
    fn unknown_values_fall_through() {
        assert_eq!(resolve_output(Some("yaml"), Some("json"), Some("bogus")), "json");
    }
}
