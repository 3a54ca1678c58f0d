//! Corpus-wide evaluation in a background task.
//!
//! Pairs are evaluated one at a time in identifier order; the local model
//! server handles a single generation at a time, so there is nothing to gain
//! from running judge calls concurrently.

use crate::config::CorpusConfig;
use crate::corpus::{CorpusScan, PairLoader};
use crate::engine::EvaluationService;
use crate::errors::LoadError;
use serde::Serialize;
use std::path::Path;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Where a pair dropped out of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Load,
    Judge,
    Store,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairFailure {
    pub identifier: String,
    pub stage: FailureStage,
    /// Machine label: a load error kind, a failure reason, or `store`.
    pub reason: String,
    pub message: String,
}

/// Accounting for one batch. `total` counts every discovered identifier,
/// orphans included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchRun {
    pub total: usize,
    pub attempted: usize,
    pub completed: usize,
    pub failed: usize,
    pub failures: Vec<PairFailure>,
    pub finished: bool,
}

impl BatchRun {
    fn record_failure(
        &mut self,
        identifier: &str,
        stage: FailureStage,
        reason: &str,
        message: String,
    ) {
        self.failed += 1;
        self.failures.push(PairFailure {
            identifier: identifier.to_string(),
            stage,
            reason: reason.to_string(),
            message,
        });
    }
}

#[derive(Clone)]
pub struct BatchOrchestrator {
    service: EvaluationService,
    corpus: CorpusConfig,
}

impl BatchOrchestrator {
    pub fn new(service: EvaluationService, corpus: CorpusConfig) -> Self {
        Self { service, corpus }
    }

    /// Scan `corpus_dir` and evaluate every pair on a spawned task.
    ///
    /// The scan happens before returning, so an unreadable corpus is reported
    /// here. An empty corpus yields a handle that is already finished. Must be
    /// called from within a tokio runtime.
    pub fn start(&self, corpus_dir: &Path) -> Result<BatchHandle, LoadError> {
        let scan = PairLoader::new(corpus_dir, &self.corpus).scan()?;
        let initial = BatchRun {
            total: scan.len(),
            finished: scan.is_empty(),
            ..BatchRun::default()
        };
        let (tx, rx) = watch::channel(initial);

        if scan.is_empty() {
            warn!(corpus = %corpus_dir.display(), "no pairs found");
            return Ok(BatchHandle { rx });
        }

        info!(
            corpus = %corpus_dir.display(),
            matched = scan.matched_count(),
            orphans = scan.orphan_count(),
            "batch started"
        );
        let service = self.service.clone();
        tokio::spawn(run_batch(service, scan, tx));
        Ok(BatchHandle { rx })
    }
}

async fn run_batch(service: EvaluationService, scan: CorpusScan, tx: watch::Sender<BatchRun>) {
    let total = scan.len();
    for (done, item) in (1usize..).zip(scan.pairs()) {
        let pair = match item {
            Ok(pair) => pair,
            Err(failure) => {
                warn!(identifier = %failure.identifier, error = %failure.error, "pair skipped");
                tx.send_modify(|run| {
                    run.record_failure(
                        &failure.identifier,
                        FailureStage::Load,
                        failure.error.kind(),
                        failure.error.to_string(),
                    )
                });
                continue;
            }
        };

        tx.send_modify(|run| run.attempted += 1);
        let stored = service
            .evaluate_and_store(&pair.identifier, &pair.request, &pair.response)
            .await;

        tx.send_modify(|run| match &stored {
            Ok(s) => match s.evaluation.outcome.detail() {
                Some(reason) if s.evaluation.is_degraded() => run.record_failure(
                    &pair.identifier,
                    FailureStage::Judge,
                    &reason,
                    format!("stored sentinel result as record {}", s.record_id),
                ),
                _ => run.completed += 1,
            },
            Err(e) => {
                error!(identifier = %pair.identifier, error = %e, "failed to store evaluation");
                run.record_failure(&pair.identifier, FailureStage::Store, "store", e.to_string());
            }
        });
        info!(identifier = %pair.identifier, done, total, "pair evaluated");
    }

    tx.send_modify(|run| run.finished = true);
    let run = tx.borrow();
    info!(
        total = run.total,
        attempted = run.attempted,
        completed = run.completed,
        failed = run.failed,
        "batch finished"
    );
}

/// Observer for a running batch. Cheap to clone.
#[derive(Debug, Clone)]
pub struct BatchHandle {
    rx: watch::Receiver<BatchRun>,
}

impl BatchHandle {
    /// Current accounting.
    pub fn snapshot(&self) -> BatchRun {
        self.rx.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.rx.borrow().finished
    }

    /// Resolve with the final accounting. If the batch task died early the
    /// last published state is returned with `finished` still false.
    pub async fn wait(&self) -> BatchRun {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|run| run.finished).await;
        self.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Evaluator;
    use crate::judge::FakeJudgeClient;
    use crate::prompt::PromptBuilder;
    use crate::storage::Store;
    use std::sync::Arc;

    fn orchestrator(store: Store) -> BatchOrchestrator {
        let evaluator =
            Evaluator::new(PromptBuilder::builtin(), Arc::new(FakeJudgeClient::new("fake")));
        BatchOrchestrator::new(EvaluationService::new(evaluator, store), CorpusConfig::default())
    }

    #[tokio::test]
    async fn empty_corpus_is_finished_immediately() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("suggestion_requests")).unwrap();
        std::fs::create_dir_all(dir.path().join("suggestion_responses")).unwrap();

        let handle = orchestrator(Store::memory().unwrap())
            .start(dir.path())
            .unwrap();
        assert!(handle.is_finished());
        assert_eq!(
            handle.wait().await,
            BatchRun {
                finished: true,
                ..BatchRun::default()
            }
        );
    }

    #[tokio::test]
    async fn missing_corpus_is_reported_by_start() {
        let dir = tempfile::tempdir().unwrap();
        let err = orchestrator(Store::memory().unwrap())
            .start(&dir.path().join("absent"))
            .unwrap_err();
        assert_eq!(err.kind(), "corpus_unreadable");
    }
}
