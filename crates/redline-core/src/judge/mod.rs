//! Judge clients: send a rendered prompt, get raw completion text back.
//!
//! Clients never retry and never interpret the completion. Retry belongs to
//! [`crate::engine::Evaluator`]; score extraction to [`crate::parse`].

mod fake;
mod ollama;

pub use fake::FakeJudgeClient;
pub use ollama::{ModelStatus, OllamaClient};

use crate::config::{ModelConfig, Provider};
use crate::errors::JudgeResult;
use async_trait::async_trait;
use std::sync::Arc;

/// Raw completion plus the provenance needed for logs.
#[derive(Debug, Clone, PartialEq)]
pub struct JudgeResponse {
    pub text: String,
    pub provider: String,
    pub model: String,
    pub duration_ms: Option<u64>,
}

#[async_trait]
pub trait JudgeClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> JudgeResult<JudgeResponse>;

    /// Check the model is present, fetching it when `pull` is set.
    async fn ensure_model(&self, pull: bool) -> JudgeResult<ModelStatus>;

    fn provider_name(&self) -> &'static str;

    fn model_name(&self) -> &str;
}

/// Build the client selected by `model.provider`.
pub fn build_client(cfg: &ModelConfig) -> JudgeResult<Arc<dyn JudgeClient>> {
    let client: Arc<dyn JudgeClient> = match cfg.provider {
        Provider::Ollama => Arc::new(OllamaClient::new(cfg)?),
        Provider::Fake => {
            let client = FakeJudgeClient::new(cfg.name.clone());
            match &cfg.fake_response {
                Some(text) => Arc::new(client.with_response(text.clone())),
                None => Arc::new(client),
            }
        }
    };
    Ok(client)
}
