use super::args::*;

pub mod batch;
pub mod doctor;
pub mod evaluate;
pub mod list;
mod output;
pub mod show;

use anyhow::Context;
use redline_core::{load_config, EvaluationService, Evaluator, RedlineConfig, Store};
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG: &str = "redline.yaml";

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let cfg = load(cli.config.as_deref())?;
    match cli.cmd {
        Command::Evaluate(args) => evaluate::run(args, &cfg).await,
        Command::Batch(args) => batch::run(args, &cfg).await,
        Command::List(args) => list::run(args, &cfg),
        Command::Show(args) => show::run(args, &cfg),
        Command::Doctor(args) => doctor::run(args, &cfg).await,
    }
}

/// An explicit `--config` must exist; the default file is optional.
fn load(explicit: Option<&Path>) -> anyhow::Result<RedlineConfig> {
    let (path, required) = match explicit {
        Some(p) => (p.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG), false),
    };
    load_config(&path, required).with_context(|| format!("loading config {}", path.display()))
}

pub(crate) fn open_store(cfg: &RedlineConfig) -> anyhow::Result<Store> {
    Store::open(&cfg.database.path)
        .with_context(|| format!("opening database {}", cfg.database.path.display()))
}

pub(crate) fn build_evaluator(cfg: &RedlineConfig) -> anyhow::Result<Evaluator> {
    Evaluator::from_config(cfg).context("building evaluator")
}

pub(crate) fn open_service(cfg: &RedlineConfig) -> anyhow::Result<EvaluationService> {
    Ok(EvaluationService::new(build_evaluator(cfg)?, open_store(cfg)?))
}

/// Verify (and pull) the model first when `judge.ensure_model` is set.
pub(crate) async fn prepare_model(cfg: &RedlineConfig, evaluator: &Evaluator) -> anyhow::Result<()> {
    if !cfg.judge.ensure_model {
        return Ok(());
    }
    let status = evaluator
        .judge()
        .ensure_model(true)
        .await
        .with_context(|| format!("preparing model {}", cfg.model.name))?;
    tracing::info!(model = %cfg.model.name, status = ?status, "model ready");
    Ok(())
}
