//! Error types for the evaluation pipeline.
//!
//! Per-pair failures ([`LoadError`], [`JudgeError`]) are absorbed by the engine and
//! the batch orchestrator. [`StoreError`] is the only class surfaced to callers of
//! the store, since losing a persisted result silently is not acceptable.

use std::path::PathBuf;
use std::time::Duration;

/// Pair discovery and parsing errors.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The corpus directory (or one of its sides) could not be listed.
    #[error("corpus unreadable: {path}: {source}")]
    CorpusUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A request file has no response file with the same stem.
    #[error("no response file for request '{identifier}'")]
    MissingResponse { identifier: String },

    /// A response file has no request file with the same stem.
    #[error("no request file for response '{identifier}'")]
    MissingRequest { identifier: String },

    /// The file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON for the expected shape.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The file parsed but its content is unusable.
    #[error("invalid {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

impl LoadError {
    /// Short machine-readable label used in batch summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CorpusUnreadable { .. } => "corpus_unreadable",
            Self::MissingResponse { .. } => "missing_response",
            Self::MissingRequest { .. } => "missing_request",
            Self::Io { .. } => "io",
            Self::Parse { .. } => "parse",
            Self::Invalid { .. } => "invalid",
        }
    }
}

/// Prompt template errors.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("failed to read prompt template {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("prompt template is missing placeholder {{{placeholder}}}")]
    MissingPlaceholder { placeholder: &'static str },
}

/// Judge client errors. The client never retries; see [`JudgeError::is_retryable`].
#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    /// Endpoint unreachable or returned a server error.
    #[error("judge unavailable: {message}")]
    Unavailable {
        message: String,
        status: Option<u16>,
    },

    /// The request did not complete within the configured timeout.
    #[error("judge timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// The configured model is not present on the model server.
    #[error("model '{model}' is not available locally")]
    ModelMissing { model: String },

    /// The server answered but the body did not have the expected shape.
    #[error("invalid judge response: {message}")]
    InvalidResponse { message: String },
}

impl JudgeError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout { .. })
    }

    pub fn reason(&self) -> FailureReason {
        match self {
            Self::Unavailable { .. } => FailureReason::JudgeUnavailable,
            Self::Timeout { .. } => FailureReason::JudgeTimeout,
            Self::ModelMissing { .. } => FailureReason::ModelMissing,
            Self::InvalidResponse { .. } => FailureReason::InvalidJudgeResponse,
        }
    }
}

/// Result type for judge operations.
pub type JudgeResult<T> = Result<T, JudgeError>;

/// Storage errors. Any of these leaves the prior record untouched.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to prepare database location {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt record {id}: {reason}")]
    Corrupt { id: i64, reason: String },

    #[error("store connection poisoned by a panicked writer")]
    Poisoned,
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("unsupported config version {found} (supported: {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Why an evaluation degraded to the sentinel result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    JudgeUnavailable,
    JudgeTimeout,
    ModelMissing,
    InvalidJudgeResponse,
    UnparseableOutput,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JudgeUnavailable => "judge_unavailable",
            Self::JudgeTimeout => "judge_timeout",
            Self::ModelMissing => "model_missing",
            Self::InvalidJudgeResponse => "invalid_judge_response",
            Self::UnparseableOutput => "unparseable_output",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "judge_unavailable" => Some(Self::JudgeUnavailable),
            "judge_timeout" => Some(Self::JudgeTimeout),
            "model_missing" => Some(Self::ModelMissing),
            "invalid_judge_response" => Some(Self::InvalidJudgeResponse),
            "unparseable_output" => Some(Self::UnparseableOutput),
            _ => None,
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
