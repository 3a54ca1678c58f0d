//! Ollama HTTP client.
//!
//! All status-code interpretation lives in [`OllamaClient::check_status`].

use super::{JudgeClient, JudgeResponse};
use crate::config::{GenerationOptions, ModelConfig};
use crate::errors::{JudgeError, JudgeResult};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

const USER_AGENT_VALUE: &str = concat!("redline/", env!("CARGO_PKG_VERSION"));

/// Pulling a model downloads gigabytes; the per-call timeout does not apply.
const PULL_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Result of a model availability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelStatus {
    Present,
    Pulled,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: &'a GenerationOptions,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: Option<String>,
    /// Nanoseconds.
    total_duration: Option<u64>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

#[derive(Serialize)]
struct PullRequest<'a> {
    model: &'a str,
    stream: bool,
}

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    options: GenerationOptions,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(cfg: &ModelConfig) -> JudgeResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let timeout = cfg.timeout();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(default_headers)
            .build()
            .map_err(|e| JudgeError::Unavailable {
                message: format!("failed to create HTTP client: {}", e),
                status: None,
            })?;

        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            model: cfg.name.clone(),
            options: cfg.options.clone(),
            timeout,
        })
    }

    /// Names of the models present on the server.
    pub async fn list_models(&self) -> JudgeResult<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);
        debug!(url = %url, "listing local models");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;
        let resp = self.check_status(resp).await?;
        let tags: TagsResponse = resp.json().await.map_err(|e| self.body_error(e))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    pub async fn pull_model(&self) -> JudgeResult<()> {
        let url = format!("{}/api/pull", self.base_url);
        info!(model = %self.model, "pulling model");
        let resp = self
            .client
            .post(&url)
            .timeout(PULL_TIMEOUT)
            .json(&PullRequest {
                model: &self.model,
                stream: false,
            })
            .send()
            .await
            .map_err(|e| self.send_error(e))?;
        self.check_status(resp).await?;
        Ok(())
    }

    fn is_configured_model(&self, name: &str) -> bool {
        name == self.model || (!self.model.contains(':') && name == format!("{}:latest", self.model))
    }

    fn send_error(&self, e: reqwest::Error) -> JudgeError {
        if e.is_timeout() {
            JudgeError::Timeout {
                timeout: self.timeout,
            }
        } else {
            JudgeError::Unavailable {
                message: e.to_string(),
                status: e.status().map(|s| s.as_u16()),
            }
        }
    }

    fn body_error(&self, e: reqwest::Error) -> JudgeError {
        if e.is_timeout() {
            JudgeError::Timeout {
                timeout: self.timeout,
            }
        } else {
            JudgeError::InvalidResponse {
                message: e.to_string(),
            }
        }
    }

    async fn check_status(&self, resp: reqwest::Response) -> JudgeResult<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND && body.contains("model") {
            return Err(JudgeError::ModelMissing {
                model: self.model.clone(),
            });
        }
        Err(JudgeError::Unavailable {
            message: format!("HTTP {}: {}", status.as_u16(), body.trim()),
            status: Some(status.as_u16()),
        })
    }
}

#[async_trait]
impl JudgeClient for OllamaClient {
    async fn complete(&self, prompt: &str) -> JudgeResult<JudgeResponse> {
        let url = format!("{}/api/generate", self.base_url);
        let started = Instant::now();
        let resp = self
            .client
            .post(&url)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
                options: &self.options,
            })
            .send()
            .await
            .map_err(|e| self.send_error(e))?;
        let resp = self.check_status(resp).await?;
        let body: GenerateResponse = resp.json().await.map_err(|e| self.body_error(e))?;
        let text = body.response.ok_or_else(|| JudgeError::InvalidResponse {
            message: "generate response has no 'response' field".to_string(),
        })?;

        let duration_ms = body
            .total_duration
            .map(|ns| ns / 1_000_000)
            .or_else(|| Some(started.elapsed().as_millis() as u64));
        debug!(model = %self.model, chars = text.len(), duration_ms = ?duration_ms, "judge completed");

        Ok(JudgeResponse {
            text,
            provider: "ollama".to_string(),
            model: self.model.clone(),
            duration_ms,
        })
    }

    async fn ensure_model(&self, pull: bool) -> JudgeResult<ModelStatus> {
        let models = self.list_models().await?;
        if models.iter().any(|m| self.is_configured_model(m)) {
            return Ok(ModelStatus::Present);
        }
        if !pull {
            return Err(JudgeError::ModelMissing {
                model: self.model.clone(),
            });
        }
        self.pull_model().await?;
        Ok(ModelStatus::Pulled)
    }

    fn provider_name(&self) -> &'static str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
