//! Persistent launch defaults.
//!
//! Layering, lowest first: the settings file, the environment, then command-line
//! flags (applied by [`crate::cli::build_config`]).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Overrides the FastTree executable from the settings file.
pub const PROGRAM_ENV: &str = "FASTTREE_BIN";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub program: Option<PathBuf>,
    pub extra_args: Vec<String>,
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
    pub workspace_root: Option<PathBuf>,
}

/// `<config dir>/fasttree-runner/settings.json`.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("fasttree-runner").join("settings.json"))
}

/// Load settings from `path` (or the default location) and apply the environment.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let mut settings = match path {
        Some(p) => read_settings(p)?,
        None => match default_settings_path() {
            Some(p) if p.exists() => read_settings(&p)?,
            _ => Settings::default(),
        },
    };
    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn read_settings(path: &Path) -> Result<Settings> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read settings {}", path.display()))?;
    let settings = serde_json::from_str(&raw)
        .with_context(|| format!("invalid settings file {}", path.display()))?;
    tracing::debug!(path = %path.display(), "settings loaded");
    Ok(settings)
}

fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var(PROGRAM_ENV).filter(|v| !v.trim().is_empty()) {
        settings.program = Some(PathBuf::from(v));
    }
}
