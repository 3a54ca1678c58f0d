use super::{open_service, prepare_model};
use crate::cli::args::{BatchArgs, OutputFormat};
use crate::exit_codes::{EXIT_NOT_FOUND, EXIT_SUCCESS};
use anyhow::Context;
use redline_core::{BatchOrchestrator, BatchRun, RedlineConfig};

pub async fn run(args: BatchArgs, cfg: &RedlineConfig) -> anyhow::Result<i32> {
    let corpus_dir = args.corpus.unwrap_or_else(|| cfg.corpus.dir.clone());
    let service = open_service(cfg)?;
    prepare_model(cfg, service.evaluator()).await?;

    let handle = BatchOrchestrator::new(service, cfg.corpus.clone())
        .start(&corpus_dir)
        .with_context(|| format!("scanning corpus {}", corpus_dir.display()))?;
    if handle.snapshot().total == 0 {
        eprintln!("no pairs found in {}", corpus_dir.display());
        return Ok(EXIT_NOT_FOUND);
    }

    let run = handle.wait().await;
    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&run)?),
        OutputFormat::Text => print_summary(&run),
    }
    Ok(EXIT_SUCCESS)
}

fn print_summary(run: &BatchRun) {
    println!(
        "batch finished: {} discovered, {} attempted, {} completed, {} failed",
        run.total, run.attempted, run.completed, run.failed
    );
    for f in &run.failures {
        println!(
            "  {} [{:?}/{}] {}",
            f.identifier, f.stage, f.reason, f.message
        );
    }
}
