use super::{JudgeClient, JudgeResponse, ModelStatus};
use crate::errors::{JudgeError, JudgeResult};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

const DEFAULT_RESPONSE: &str = r#"{"compliance_score": 5, "minimal_edits_score": 5, "example_usage_score": 5, "overall_score": 5}"#;

/// Judge without a model server.
///
/// Scripted entries are consumed in order; once exhausted the fixed response is
/// returned for every call.
#[derive(Debug)]
pub struct FakeJudgeClient {
    model: String,
    fixed_response: String,
    script: Mutex<VecDeque<JudgeResult<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl FakeJudgeClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            fixed_response: DEFAULT_RESPONSE.to_string(),
            script: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.fixed_response = response.into();
        self
    }

    /// Queue one outcome for the next call.
    pub fn push(&self, outcome: JudgeResult<String>) -> &Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(outcome);
        }
        self
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl JudgeClient for FakeJudgeClient {
    async fn complete(&self, prompt: &str) -> JudgeResult<JudgeResponse> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        let text = match next {
            Some(outcome) => outcome?,
            None => self.fixed_response.clone(),
        };
        Ok(JudgeResponse {
            text,
            provider: "fake".to_string(),
            model: self.model.clone(),
            duration_ms: Some(0),
        })
    }

    async fn ensure_model(&self, _pull: bool) -> JudgeResult<ModelStatus> {
        if self.model.is_empty() {
            return Err(JudgeError::ModelMissing {
                model: self.model.clone(),
            });
        }
        Ok(ModelStatus::Present)
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_outcomes_then_fixed_response() {
        let client = FakeJudgeClient::new("fake-model").with_response("fixed");
        client
            .push(Ok("first".into()))
            .push(Err(JudgeError::Unavailable {
                message: "down".into(),
                status: None,
            }));

        assert_eq!(client.complete("p1").await.unwrap().text, "first");
        assert!(client.complete("p2").await.is_err());
        assert_eq!(client.complete("p3").await.unwrap().text, "fixed");
        assert_eq!(client.prompts(), vec!["p1", "p2", "p3"]);
    }
}
