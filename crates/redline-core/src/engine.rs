//! Single-pair evaluation: prompt, judge, parse.

use crate::config::RedlineConfig;
use crate::errors::{JudgeError, PromptError, StoreResult};
use crate::judge::{build_client, JudgeClient, JudgeResponse};
use crate::model::{
    Evaluation, EvaluationOutcome, EvaluationResult, SuggestionRequest, SuggestionResponse,
};
use crate::parse::parse_scores;
use crate::prompt::{prompt_digest, PromptBuilder};
use crate::storage::Store;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Errors raised while wiring an [`Evaluator`] from configuration.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error(transparent)]
    Judge(#[from] JudgeError),
}

#[derive(Clone)]
pub struct Evaluator {
    prompt: PromptBuilder,
    judge: Arc<dyn JudgeClient>,
    max_attempts: u32,
    backoff: Duration,
}

impl Evaluator {
    pub fn new(prompt: PromptBuilder, judge: Arc<dyn JudgeClient>) -> Self {
        Self {
            prompt,
            judge,
            max_attempts: 1,
            backoff: Duration::from_millis(500),
        }
    }

    pub fn from_config(cfg: &RedlineConfig) -> Result<Self, SetupError> {
        let prompt = PromptBuilder::from_config(&cfg.prompt)?;
        let judge = build_client(&cfg.model)?;
        Ok(Self::new(prompt, judge)
            .with_retries(cfg.judge.max_attempts, Duration::from_millis(cfg.judge.retry_backoff_ms)))
    }

    /// Total attempts per pair (minimum 1). The wait before attempt `n + 1`
    /// is `backoff * n`.
    pub fn with_retries(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff = backoff;
        self
    }

    pub fn judge(&self) -> &Arc<dyn JudgeClient> {
        &self.judge
    }

    /// Evaluate one pair. Judge and parse failures become a degraded
    /// evaluation carrying the sentinel result; this never fails.
    pub async fn evaluate_one(
        &self,
        request: &SuggestionRequest,
        response: &SuggestionResponse,
    ) -> Evaluation {
        let prompt = self.prompt.render(request, response);
        let digest = prompt_digest(&prompt);

        let text = match self.complete_with_retry(&prompt).await {
            Ok(resp) => {
                debug!(
                    provider = %resp.provider,
                    model = %resp.model,
                    duration_ms = ?resp.duration_ms,
                    "judge responded"
                );
                resp.text
            }
            Err(e) => {
                warn!(error = %e, reason = %e.reason(), "judge call failed, using sentinel result");
                return Evaluation {
                    result: EvaluationResult::SENTINEL,
                    outcome: EvaluationOutcome::Degraded { reason: e.reason() },
                    prompt_digest: digest,
                };
            }
        };

        let parsed = parse_scores(&text);
        let outcome = parsed.outcome();
        match (&outcome, parsed.strategy) {
            (EvaluationOutcome::Degraded { .. }, _) => {
                warn!(chars = text.len(), "judge output contained no scores")
            }
            (EvaluationOutcome::Partial { .. }, Some(strategy)) => warn!(
                strategy = strategy.as_str(),
                missing = ?parsed.missing,
                "judge output was missing criteria"
            ),
            (_, Some(strategy)) => debug!(strategy = strategy.as_str(), "scores extracted"),
            _ => {}
        }

        Evaluation {
            result: parsed.result,
            outcome,
            prompt_digest: digest,
        }
    }

    async fn complete_with_retry(&self, prompt: &str) -> Result<JudgeResponse, JudgeError> {
        let mut attempt = 1;
        loop {
            match self.judge.complete(prompt).await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let backoff = self.backoff * attempt;
                    warn!(
                        error = %e,
                        attempt,
                        max_attempts = self.max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        "retrying judge call"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// What [`EvaluationService`] hands back after persisting.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvaluation {
    pub record_id: i64,
    pub identifier: String,
    pub evaluation: Evaluation,
}

/// Engine plus store: evaluate a pair and persist the outcome.
#[derive(Clone)]
pub struct EvaluationService {
    evaluator: Evaluator,
    store: Store,
}

impl EvaluationService {
    pub fn new(evaluator: Evaluator, store: Store) -> Self {
        Self { evaluator, store }
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub async fn evaluate_and_store(
        &self,
        identifier: &str,
        request: &SuggestionRequest,
        response: &SuggestionResponse,
    ) -> StoreResult<StoredEvaluation> {
        let evaluation = self.evaluator.evaluate_one(request, response).await;
        let record_id = self
            .store
            .upsert(identifier, request, response, &evaluation)?;
        info!(
            identifier,
            record_id,
            outcome = evaluation.outcome.kind().as_str(),
            overall = evaluation.result.overall_score,
            "evaluation stored"
        );
        Ok(StoredEvaluation {
            record_id,
            identifier: identifier.to_string(),
            evaluation,
        })
    }

    /// Evaluate an ad-hoc pair under a fresh UUID v4 identifier.
    pub async fn submit(
        &self,
        request: &SuggestionRequest,
        response: &SuggestionResponse,
    ) -> StoreResult<StoredEvaluation> {
        let identifier = uuid::Uuid::new_v4().to_string();
        self.evaluate_and_store(&identifier, request, response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FailureReason;
    use crate::judge::FakeJudgeClient;

    fn pair() -> (SuggestionRequest, SuggestionResponse) {
        (
            SuggestionRequest::new("missing clause").with_rule("must include termination clause"),
            SuggestionResponse::new(vec!["Either party may terminate.".into()]),
        )
    }

    fn unavailable() -> JudgeError {
        JudgeError::Unavailable {
            message: "connection refused".into(),
            status: None,
        }
    }

    #[tokio::test]
    async fn retries_transport_errors_until_success() {
        let fake = Arc::new(FakeJudgeClient::new("m"));
        fake.push(Err(unavailable())).push(Ok(
            r#"{"compliance_score": 9, "minimal_edits_score": 9, "example_usage_score": 9}"#.into(),
        ));
        let evaluator = Evaluator::new(PromptBuilder::builtin(), fake.clone())
            .with_retries(3, Duration::from_millis(1));

        let (req, resp) = pair();
        let eval = evaluator.evaluate_one(&req, &resp).await;
        assert_eq!(eval.outcome, EvaluationOutcome::Complete);
        assert_eq!(eval.result.overall_score, 9.0);
        assert_eq!(fake.prompts().len(), 2);
    }

    #[tokio::test]
    async fn model_missing_is_not_retried() {
        let fake = Arc::new(FakeJudgeClient::new("m"));
        fake.push(Err(JudgeError::ModelMissing { model: "m".into() }));
        let evaluator = Evaluator::new(PromptBuilder::builtin(), fake.clone())
            .with_retries(3, Duration::from_millis(1));

        let (req, resp) = pair();
        let eval = evaluator.evaluate_one(&req, &resp).await;
        assert_eq!(
            eval.outcome,
            EvaluationOutcome::Degraded {
                reason: FailureReason::ModelMissing
            }
        );
        assert!(eval.result.is_sentinel());
        assert_eq!(fake.prompts().len(), 1);
    }

    #[tokio::test]
    async fn digest_matches_rendered_prompt() {
        let fake = Arc::new(FakeJudgeClient::new("m"));
        let evaluator = Evaluator::new(PromptBuilder::builtin(), fake.clone());
        let (req, resp) = pair();
        let eval = evaluator.evaluate_one(&req, &resp).await;
        assert_eq!(eval.prompt_digest, prompt_digest(&fake.prompts()[0]));
    }

    #[tokio::test]
    async fn submit_uses_fresh_uuid_identifiers() {
        let evaluator = Evaluator::new(PromptBuilder::builtin(), Arc::new(FakeJudgeClient::new("m")));
        let service = EvaluationService::new(evaluator, Store::memory().unwrap());
        let (req, resp) = pair();

        let a = service.submit(&req, &resp).await.unwrap();
        let b = service.submit(&req, &resp).await.unwrap();
        assert_ne!(a.identifier, b.identifier);
        assert!(uuid::Uuid::parse_str(&a.identifier).is_ok());
        assert_eq!(service.store().count().unwrap(), 2);
    }
}
