//! Runtime configuration: workspace root, network bind address, run mode,
//! bearer-auth key source, and the diligence-push default budget. Loaded
//! from an optional TOML file and overlaid with CLI flags by the binary
//! crate; the core only knows the resolved [`RuntimeConfig`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::RunMode;

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7700
}

fn default_diligence_push_max() -> i64 {
    12
}

fn default_allow_resume_from_interrupted() -> bool {
    false
}

fn default_ui_language() -> String {
    "en".to_string()
}

/// On-disk TOML shape. Every field optional so a team can commit a
/// partial file and let the rest fall back to defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Workspace root the event store's on-disk layout is rooted at.
    /// Resolved to an absolute path at load time.
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// `dev` disables auth outright; `prod` requires a key (configured or
    /// generated). Overridden by the CLI's `--mode` flag.
    #[serde(default)]
    pub mode: ConfiguredMode,

    /// The auth key, when configured directly in the file rather than via
    /// environment. An explicit empty string disables auth even in `prod`.
    #[serde(default)]
    pub auth_key: Option<String>,

    /// The default `diligencePushRemainingBudget` ceiling. `<= 0` means
    /// push is implicitly disabled team-wide; refill then adds a flat `+3`
    /// instead of resetting to this ceiling.
    #[serde(default = "default_diligence_push_max")]
    pub diligence_push_max: i64,

    #[serde(default = "default_allow_resume_from_interrupted")]
    pub allow_resume_from_interrupted: bool,

    #[serde(default = "default_ui_language")]
    pub ui_language: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workspace_root: None,
            host: default_host(),
            port: default_port(),
            mode: ConfiguredMode::default(),
            auth_key: None,
            diligence_push_max: default_diligence_push_max(),
            allow_resume_from_interrupted: default_allow_resume_from_interrupted(),
            ui_language: default_ui_language(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfiguredMode {
    #[default]
    Dev,
    Prod,
}

impl From<ConfiguredMode> for RunMode {
    fn from(mode: ConfiguredMode) -> Self {
        match mode {
            ConfiguredMode::Dev => RunMode::Dev,
            ConfiguredMode::Prod => RunMode::Prod,
        }
    }
}

impl RuntimeConfig {
    /// Loads from a TOML file if present at `path`; a missing file yields
    /// defaults rather than an error, so a fresh workspace needs no
    /// config file at all.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(err).with_context(|| format!("reading config file {}", path.display()))
            }
        };
        toml::from_str(&content).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn resolved_workspace_root(&self, fallback: &Path) -> PathBuf {
        self.workspace_root.clone().unwrap_or_else(|| fallback.to_path_buf())
    }
}
