//! Configuration management for reqflow.
//!
//! Handles loading configuration from TOML files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Local configuration file name.
pub const LOCAL_CONFIG_FILE: &str = ".reqflow.toml";

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Rule engine settings
    pub rules: RulesConfig,

    /// Pipeline settings
    pub pipeline: PipelineConfig,
}

/// General settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Where documents are stored (default: `<data_dir>/reqflow/documents`)
    pub data_dir: Option<String>,

    /// Log level used when neither `RUST_LOG` nor `--verbose` is set
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self { data_dir: None, log_level: "warn".to_string() }
    }
}

/// Rule engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Directory with `<category>.{json,yaml,yml}` rule sets and `templates/`
    pub dir: Option<String>,

    /// Use the built-in set for categories without a file in `dir`
    pub include_builtin: bool,

    /// Default deadline for validation commands, in seconds
    pub validation_timeout_secs: u64,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self { dir: None, include_builtin: true, validation_timeout_secs: 30 }
    }
}

impl RulesConfig {
    pub fn validation_timeout(&self) -> Duration {
        Duration::from_secs(self.validation_timeout_secs)
    }
}

/// Pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Consult the rule engine during generation/validation phases
    pub apply_rules: bool,

    /// JSON-lines file that successful runs are appended to
    pub pattern_log: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { apply_rules: true, pattern_log: None }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Looks for config in:
    /// 1. `.reqflow.toml` in current directory
    /// 2. `~/.config/reqflow/config.toml`
    /// 3. Falls back to defaults
    pub fn load() -> anyhow::Result<Self> {
        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Some(global_config) = Self::config_dir().map(|d| d.join("config.toml")) {
            if global_config.exists() {
                return Self::load_from_file(&global_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config {}: {e}", path.display()))?;
        tracing::debug!(path = ?path, "Loaded config");
        Ok(config)
    }

    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("reqflow"))
    }

    /// Document directory: configured, else under the platform data dir,
    /// else `./.reqflow/documents`.
    pub fn documents_dir(&self) -> PathBuf {
        self.general.data_dir.as_deref().map(expand_path).unwrap_or_else(|| {
            dirs::data_dir()
                .map(|d| d.join("reqflow").join("documents"))
                .unwrap_or_else(|| PathBuf::from(".reqflow").join("documents"))
        })
    }

    /// Rule directory, if configured.
    pub fn rules_dir(&self) -> Option<PathBuf> {
        self.rules.dir.as_deref().map(expand_path)
    }

    /// Pattern log path, if configured.
    pub fn pattern_log(&self) -> Option<PathBuf> {
        self.pipeline.pattern_log.as_deref().map(expand_path)
    }
}

/// Expand `~` and environment variables in a configured path.
pub fn expand_path(path: &str) -> PathBuf {
    match shellexpand::full(path) {
        Ok(expanded) => PathBuf::from(expanded.into_owned()),
        Err(_) => PathBuf::from(shellexpand::tilde(path).into_owned()),
    }
}
