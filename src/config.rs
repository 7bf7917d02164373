//! Global configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Backend subprocess configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BackendConfig {
    /// Backend CLI binary (e.g., `claude`).
    pub host_cli: String,
    /// Arguments passed to the backend CLI.
    #[serde(default = "default_host_cli_args")]
    pub host_cli_args: Vec<String>,
    /// Workspace root; the backend starts here and built-in tools are confined to it.
    pub workspace_root: PathBuf,
    /// Forward backend stderr lines to the log.
    #[serde(default = "default_true")]
    pub stderr_log: bool,
}

/// Per-turn limits and policies consumed by the turn engine.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TurnConfig {
    /// Token ceiling for one turn; unbounded when absent.
    #[serde(default)]
    pub max_tokens: Option<u64>,
    /// Tool round-trip ceiling for one turn; unbounded when absent.
    #[serde(default)]
    pub max_turn_requests: Option<u64>,
    /// Texts shorter than this many characters are searched for refusal
    /// phrases anywhere, longer ones only at the start.
    #[serde(default = "default_refusal_threshold")]
    pub refusal_short_text_threshold: usize,
    /// Treat malformed backend lines as a hard turn failure.
    #[serde(default)]
    pub strict_protocol: bool,
    /// Upper bound on draining an interrupted round after cancellation.
    #[serde(default = "default_cancel_drain_timeout_ms")]
    pub cancel_drain_timeout_ms: u64,
}

impl TurnConfig {
    /// How long to discard backend output after a cancellation.
    #[must_use]
    pub fn cancel_drain_timeout(&self) -> Duration {
        Duration::from_millis(self.cancel_drain_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.max_tokens == Some(0) {
            return Err(AppError::Config(
                "max_tokens must be greater than zero".into(),
            ));
        }
        if self.max_turn_requests == Some(0) {
            return Err(AppError::Config(
                "max_turn_requests must be greater than zero".into(),
            ));
        }
        if self.refusal_short_text_threshold == 0 {
            return Err(AppError::Config(
                "refusal_short_text_threshold must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            max_tokens: None,
            max_turn_requests: None,
            refusal_short_text_threshold: default_refusal_threshold(),
            strict_protocol: false,
            cancel_drain_timeout_ms: default_cancel_drain_timeout_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_host_cli_args() -> Vec<String> {
    [
        "-p",
        "--output-format",
        "stream-json",
        "--input-format",
        "stream-json",
        "--verbose",
    ]
    .iter()
    .map(|s| (*s).to_owned())
    .collect()
}

fn default_refusal_threshold() -> usize {
    200
}

fn default_cancel_drain_timeout_ms() -> u64 {
    2000
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Backend subprocess settings.
    pub backend: BackendConfig,
    /// Turn limits and policies.
    #[serde(default)]
    pub turn: TurnConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Absolute path to the workspace root.
    #[must_use]
    pub fn workspace_root(&self) -> &Path {
        &self.backend.workspace_root
    }

    fn validate(&mut self) -> Result<()> {
        if self.backend.host_cli.trim().is_empty() {
            return Err(AppError::Config("host_cli must not be empty".into()));
        }

        self.turn.validate()?;

        let canonical_root = self
            .backend
            .workspace_root
            .canonicalize()
            .map_err(|err| AppError::Config(format!("workspace_root invalid: {err}")))?;
        self.backend.workspace_root = canonical_root;

        Ok(())
    }
}
