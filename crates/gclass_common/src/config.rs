//! Classifier configuration.
//!
//! Loaded from `gclass.toml` (or the file named by `$GCLASS_CONFIG`).
//! Every field has a default, so an absent file means default settings.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "GCLASS_CONFIG";

/// Config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "gclass.toml";

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEEPINFRA_BASE_URL: &str = "https://api.deepinfra.com/v1/openai";

/// Config errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Provider 'custom' requires backend.base_url")]
    MissingBaseUrl,
}

/// Which scoring backend to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Chat completion over HTTP
    #[default]
    Cloud,
    /// In-process constrained scoring
    Local,
}

/// OpenAI-compatible endpoint family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    OpenAi,
    DeepInfra,
    /// Any compatible server at `base_url`
    Custom,
}

/// Backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,

    #[serde(default)]
    pub provider: Provider,

    /// Overrides the provider's default URL
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the API key (e.g. "OPENAI_API_KEY")
    #[serde(default = "default_api_key_env")]
    pub api_key_env: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Completion budget; answers are a single label so this stays small
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub temperature: f32,

    /// Reasoning steps before answering; any non-zero value makes backends return `Unsupported`
    #[serde(default)]
    pub think_steps: u32,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> Option<String> {
    Some("OPENAI_API_KEY".to_string())
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_tokens() -> u32 {
    30
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            provider: Provider::default(),
            base_url: None,
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            think_steps: 0,
        }
    }
}

impl BackendConfig {
    /// Explicit `base_url`, else the provider's endpoint
    pub fn resolved_base_url(&self) -> Result<String, ConfigError> {
        if let Some(url) = &self.base_url {
            return Ok(url.clone());
        }
        match self.provider {
            Provider::OpenAi => Ok(OPENAI_BASE_URL.to_string()),
            Provider::DeepInfra => Ok(DEEPINFRA_BASE_URL.to_string()),
            Provider::Custom => Err(ConfigError::MissingBaseUrl),
        }
    }

    /// API key from the configured environment variable, if set and non-empty
    pub fn api_key(&self) -> Option<String> {
        let var = self.api_key_env.as_ref()?;
        std::env::var(var).ok().filter(|key| !key.trim().is_empty())
    }
}

/// Defaults for classification passes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifySettings {
    /// Ask the backend for probability scoring over the candidate set
    #[serde(default = "default_true")]
    pub constrained_output: bool,

    /// Log every topic decision at info level
    #[serde(default = "default_true")]
    pub single_mode: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ClassifySettings {
    fn default() -> Self {
        Self {
            constrained_output: true,
            single_mode: true,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub classify: ClassifySettings,
}

impl ClassifierConfig {
    /// Path from `$GCLASS_CONFIG`, else `./gclass.toml`
    pub fn default_path() -> PathBuf {
        std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Load from `path`; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&content).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;

        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load(&Self::default_path())
    }

    pub fn from_toml(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| e.to_string())
    }
}
