//! Configuration management for textdigest using the prefer crate.
//!
//! Precedence, lowest to highest: built-in defaults, the config file
//! (explicit `--config` or discovered by prefer), `DIGEST_*` / `LLM_*`
//! environment variables, then command-line flags.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::ExecutionStrategy;
use crate::llm::prompts::DEFAULT_MAX_INPUT_CHARS;
use crate::llm::{LlmConfig, PromptTemplates, TemplateError};

/// Default storage root for source texts.
pub const DEFAULT_STORAGE_DIR: &str = "public";
/// Default reference analyzed when a request names none.
pub const DEFAULT_SOURCE: &str = "ejemplo1.txt";
/// Default directory for persisted reports.
pub const DEFAULT_REPORTS_DIR: &str = "storage/reports";
/// Default server bind address.
pub const DEFAULT_BIND: &str = "127.0.0.1:3030";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {format} config {path}: {message}")]
    Parse {
        path: PathBuf,
        format: &'static str,
        message: String,
    },
    #[error("invalid prompt template: {0}")]
    Template(#[from] TemplateError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Analysis pipeline configuration (`[analysis]` table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Payload characters substituted into any prompt.
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    /// Stage scheduling: "sequential" or "concurrent".
    #[serde(default)]
    pub strategy: ExecutionStrategy,
    /// Per-stage deadline in seconds (0 disables it).
    #[serde(default = "default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,
    /// Prompt template overrides.
    #[serde(default, skip_serializing_if = "PromptTemplates::is_default")]
    pub prompts: PromptTemplates,
}

fn default_max_input_chars() -> usize {
    DEFAULT_MAX_INPUT_CHARS
}

fn default_stage_timeout_secs() -> u64 {
    300
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_input_chars: default_max_input_chars(),
            strategy: ExecutionStrategy::default(),
            stage_timeout_secs: default_stage_timeout_secs(),
            prompts: PromptTemplates::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    pub fn stage_timeout(&self) -> Option<Duration> {
        match self.stage_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_input_chars == 0 {
            return Err(ConfigError::Invalid(
                "analysis.max_input_chars must be > 0".to_string(),
            ));
        }
        self.prompts.validate()?;
        Ok(())
    }
}

/// Resolved application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Root directory that source references resolve inside.
    pub storage_dir: PathBuf,
    /// Reference used when a request names none.
    pub default_source: String,
    /// Directory reports are written to.
    pub reports_dir: PathBuf,
    /// Server bind address.
    pub bind: String,
    pub llm: LlmConfig,
    pub analysis: AnalysisConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            default_source: DEFAULT_SOURCE.to_string(),
            reports_dir: PathBuf::from(DEFAULT_REPORTS_DIR),
            bind: DEFAULT_BIND.to_string(),
            llm: LlmConfig::default(),
            analysis: AnalysisConfig::default(),
        }
    }
}

impl Settings {
    /// Settings rooted at `base_dir`, everything else default.
    pub fn with_base_dir(base_dir: &Path) -> Self {
        Self {
            storage_dir: base_dir.join(DEFAULT_STORAGE_DIR),
            reports_dir: base_dir.join(DEFAULT_REPORTS_DIR),
            ..Default::default()
        }
    }

    /// Check values that would make every analysis fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_source.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "default_source must not be empty".to_string(),
            ));
        }
        self.llm.validate().map_err(ConfigError::Invalid)?;
        self.analysis.validate()
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Storage root for source texts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_dir: Option<String>,
    /// Default source reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_source: Option<String>,
    /// Reports directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reports_dir: Option<String>,
    /// Server bind address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
    /// Generation backend configuration.
    #[serde(default, skip_serializing_if = "LlmConfig::is_default")]
    pub llm: LlmConfig,
    /// Analysis pipeline configuration.
    #[serde(default, skip_serializing_if = "AnalysisConfig::is_default")]
    pub analysis: AnalysisConfig,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer for discovery.
    /// Automatically discovers textdigest config files in standard locations.
    pub async fn load() -> Result<Self, ConfigError> {
        match prefer::load("textdigest").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => Self::load_from_path(path).await,
                None => Ok(Self::default_with_env()),
            },
            Err(e) => {
                tracing::debug!("No config file discovered: {}", e);
                Ok(Self::default_with_env())
            }
        }
    }

    /// Default config with `LLM_*` environment overrides applied.
    pub fn default_with_env() -> Self {
        let mut config = Self::default();
        config.llm = config.llm.with_env_overrides();
        config
    }

    /// Load configuration from a specific file path.
    /// The format follows the extension: TOML, YAML, otherwise JSON.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        Self::load_from_path_with_env(path, |key| std::env::var(key).ok()).await
    }

    /// Like [`Config::load_from_path`], reading `LLM_*` overrides through `lookup`.
    pub async fn load_from_path_with_env(
        path: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let parse_error = |format: &'static str, message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            format,
            message,
        };

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents).map_err(|e| parse_error("TOML", e.to_string()))?,
            "yaml" | "yml" => {
                serde_yaml::from_str(&contents).map_err(|e| parse_error("YAML", e.to_string()))?
            }
            _ => serde_json::from_str(&contents).map_err(|e| parse_error("JSON", e.to_string()))?,
        };

        config.source_path = Some(path.to_path_buf());
        config.llm = config.llm.with_env_lookup(lookup);
        Ok(config)
    }

    /// Directory of the config file, if loaded from one.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are joined onto `base_dir`
    pub fn resolve_path(path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply file values to settings, resolving paths against `base_dir`.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref dir) = self.storage_dir {
            settings.storage_dir = Self::resolve_path(dir, base_dir);
        }
        if let Some(ref source) = self.default_source {
            settings.default_source = source.clone();
        }
        if let Some(ref dir) = self.reports_dir {
            settings.reports_dir = Self::resolve_path(dir, base_dir);
        }
        if let Some(ref bind) = self.bind {
            settings.bind = bind.clone();
        }
        settings.llm = self.llm.clone();
        settings.analysis = self.analysis.clone();
    }

    /// Render as TOML for display.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Storage root (--storage flag), highest precedence.
    pub storage_dir: Option<PathBuf>,
}

/// Apply `DIGEST_*` overrides from `lookup`; paths resolve against `cwd`.
fn apply_env_overrides(
    settings: &mut Settings,
    cwd: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let var = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());

    if let Some(dir) = var("DIGEST_STORAGE_DIR") {
        tracing::debug!("Using DIGEST_STORAGE_DIR from environment: {}", dir);
        settings.storage_dir = Config::resolve_path(&dir, cwd);
    }
    if let Some(source) = var("DIGEST_DEFAULT_SOURCE") {
        settings.default_source = source;
    }
    if let Some(dir) = var("DIGEST_REPORTS_DIR") {
        tracing::debug!("Using DIGEST_REPORTS_DIR from environment: {}", dir);
        settings.reports_dir = Config::resolve_path(&dir, cwd);
    }
    if let Some(bind) = var("DIGEST_BIND") {
        settings.bind = bind;
    }
}

/// Load settings with explicit options.
/// Returns the resolved settings and the file config they came from.
pub async fn load_settings_with_options(
    options: LoadOptions,
) -> Result<(Settings, Config), ConfigError> {
    load_settings_with_env(options, |key| std::env::var(key).ok()).await
}

/// Load settings, reading `LLM_*` and `DIGEST_*` variables through `lookup`.
async fn load_settings_with_env(
    options: LoadOptions,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(Settings, Config), ConfigError> {
    let config = match options.config_path {
        Some(ref path) => Config::load_from_path_with_env(path, &lookup).await?,
        None => Config::load().await?,
    };

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let base_dir = config.base_dir().unwrap_or_else(|| cwd.clone());

    let mut settings = Settings::with_base_dir(&base_dir);
    config.apply_to_settings(&mut settings, &base_dir);
    apply_env_overrides(&mut settings, &cwd, &lookup);

    if let Some(dir) = options.storage_dir {
        settings.storage_dir = if dir.is_absolute() { dir } else { cwd.join(dir) };
    }

    settings.validate()?;
    Ok((settings, config))
}
