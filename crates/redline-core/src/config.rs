//! Runtime configuration.
//!
//! Loaded from YAML, then overridden from the environment:
//!
//! | Variable | Description |
//! |----------|-------------|
//! | `REDLINE_MODEL` | Judge model name (default: `llama3:8b`) |
//! | `REDLINE_OLLAMA_URL` | Ollama base URL (default: `http://localhost:11434`) |
//! | `REDLINE_DB` | SQLite database path (default: `evaluations.db`) |
//! | `REDLINE_CORPUS_DIR` | Corpus directory (default: `data`) |

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RedlineConfig {
    pub version: u32,
    pub model: ModelConfig,
    pub judge: JudgeConfig,
    pub database: DatabaseConfig,
    pub corpus: CorpusConfig,
    pub prompt: PromptConfig,
}

impl Default for RedlineConfig {
    fn default() -> Self {
        Self {
            version: SUPPORTED_CONFIG_VERSION,
            model: ModelConfig::default(),
            judge: JudgeConfig::default(),
            database: DatabaseConfig::default(),
            corpus: CorpusConfig::default(),
            prompt: PromptConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    #[default]
    Ollama,
    /// Fixed response, no model server. For dry runs and tests.
    Fake,
}

/// Which model judges and how to reach it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    pub provider: Provider,
    pub name: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub options: GenerationOptions,
    /// Completion returned by the `fake` provider.
    pub fake_response: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Ollama,
            name: "llama3:8b".to_string(),
            base_url: "http://localhost:11434".to_string(),
            timeout_secs: 120,
            options: GenerationOptions::default(),
            fake_response: None,
        }
    }
}

impl ModelConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Sampling parameters sent with every judge call.
///
/// The defaults keep output low-variance: short completions, temperature 0.1,
/// nucleus sampling over the top 90% of mass, and a repetition penalty of 1.2.
/// Setting `seed` makes the server's sampling reproducible for identical prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenerationOptions {
    pub num_predict: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub repeat_penalty: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_thread: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            num_predict: 512,
            temperature: 0.1,
            top_p: 0.9,
            repeat_penalty: 1.2,
            num_thread: Some(4),
            seed: None,
        }
    }
}

/// Engine-level orchestration of judge calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JudgeConfig {
    /// Total attempts per pair for retryable judge errors. 1 disables retry.
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    /// Verify (and pull if missing) the model before evaluating.
    pub ensure_model: bool,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            retry_backoff_ms: 500,
            ensure_model: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("evaluations.db"),
        }
    }
}

/// Where pairs live: `<dir>/<requests_subdir>/*.json` and `<dir>/<responses_subdir>/*.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorpusConfig {
    pub dir: PathBuf,
    pub requests_subdir: String,
    pub responses_subdir: String,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
            requests_subdir: "suggestion_requests".to_string(),
            responses_subdir: "suggestion_responses".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PromptConfig {
    /// Custom template file. The builtin template is used when unset.
    pub template_path: Option<PathBuf>,
}

impl RedlineConfig {
    /// Parse YAML. Relative paths stay relative to the working directory.
    pub fn from_yaml_str(raw: &str, origin: &Path) -> Result<Self, ConfigError> {
        // An empty document deserializes to unit, not to a map.
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: RedlineConfig =
            serde_yaml::from_str(raw).map_err(|source| ConfigError::Parse {
                path: origin.to_path_buf(),
                source,
            })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `REDLINE_*` environment overrides.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub(crate) fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("REDLINE_MODEL").filter(|v| !v.is_empty()) {
            self.model.name = v;
        }
        if let Some(v) = lookup("REDLINE_OLLAMA_URL").filter(|v| !v.is_empty()) {
            self.model.base_url = v;
        }
        if let Some(v) = lookup("REDLINE_DB").filter(|v| !v.is_empty()) {
            self.database.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("REDLINE_CORPUS_DIR").filter(|v| !v.is_empty()) {
            self.corpus.dir = PathBuf::from(v);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != SUPPORTED_CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion {
                found: self.version,
                supported: SUPPORTED_CONFIG_VERSION,
            });
        }
        if self.model.name.trim().is_empty() {
            return Err(ConfigError::Invalid("model.name must not be empty".into()));
        }
        if self.model.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "model.timeout_secs must be greater than zero".into(),
            ));
        }
        if self.judge.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "judge.max_attempts must be at least 1".into(),
            ));
        }
        let o = &self.model.options;
        if !(0.0..=2.0).contains(&o.temperature) {
            return Err(ConfigError::Invalid(format!(
                "model.options.temperature {} outside [0, 2]",
                o.temperature
            )));
        }
        if !(0.0..=1.0).contains(&o.top_p) || o.top_p == 0.0 {
            return Err(ConfigError::Invalid(format!(
                "model.options.top_p {} outside (0, 1]",
                o.top_p
            )));
        }
        Ok(())
    }
}

/// Load config from `path`. With `required == false` a missing file yields defaults.
/// Environment overrides are applied in both cases.
pub fn load_config(path: &Path, required: bool) -> Result<RedlineConfig, ConfigError> {
    let mut cfg = match std::fs::read_to_string(path) {
        Ok(raw) => RedlineConfig::from_yaml_str(&raw, path)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            RedlineConfig::default()
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    cfg.apply_env();
    cfg.validate()?;
    Ok(cfg)
}
