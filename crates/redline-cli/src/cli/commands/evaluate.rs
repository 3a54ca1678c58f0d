use super::output::evaluation_text;
use super::{build_evaluator, open_store, prepare_model};
use crate::cli::args::{EvaluateArgs, OutputFormat};
use crate::exit_codes::EXIT_SUCCESS;
use anyhow::Context;
use redline_core::corpus::{load_request, load_response};
use redline_core::{EvaluationService, RedlineConfig};

pub async fn run(args: EvaluateArgs, cfg: &RedlineConfig) -> anyhow::Result<i32> {
    let request = load_request(&args.request).context("loading request")?;
    let response = load_response(&args.response).context("loading response")?;
    let evaluator = build_evaluator(cfg)?;
    prepare_model(cfg, &evaluator).await?;

    if args.no_store {
        let evaluation = evaluator.evaluate_one(&request, &response).await;
        match args.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&evaluation)?),
            OutputFormat::Text => println!("{}", evaluation_text(None, None, &evaluation)),
        }
        return Ok(EXIT_SUCCESS);
    }

    let service = EvaluationService::new(evaluator, open_store(cfg)?);
    let stored = match &args.id {
        Some(id) => service.evaluate_and_store(id, &request, &response).await?,
        None => service.submit(&request, &response).await?,
    };

    match args.format {
        OutputFormat::Json => {
            let out = serde_json::json!({
                "identifier": stored.identifier,
                "record_id": stored.record_id,
                "result": stored.evaluation.result,
                "outcome": stored.evaluation.outcome,
                "prompt_digest": stored.evaluation.prompt_digest,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => println!(
            "{}",
            evaluation_text(
                Some(&stored.identifier),
                Some(stored.record_id),
                &stored.evaluation
            )
        ),
    }
    Ok(EXIT_SUCCESS)
}
