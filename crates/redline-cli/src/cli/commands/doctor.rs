use super::open_store;
use crate::cli::args::DoctorArgs;
use crate::exit_codes::{EXIT_CONFIG_ERROR, EXIT_NOT_FOUND, EXIT_SUCCESS};
use redline_core::errors::JudgeError;
use redline_core::judge::{build_client, ModelStatus};
use redline_core::RedlineConfig;

pub async fn run(args: DoctorArgs, cfg: &RedlineConfig) -> anyhow::Result<i32> {
    let judge = build_client(&cfg.model)?;
    println!(
        "judge:    {} {} ({})",
        judge.provider_name(),
        judge.model_name(),
        cfg.model.base_url
    );

    let store = open_store(cfg)?;
    println!(
        "database: {} ({} records)",
        cfg.database.path.display(),
        store.count()?
    );

    match judge.ensure_model(args.pull).await {
        Ok(ModelStatus::Present) => println!("model:    present"),
        Ok(ModelStatus::Pulled) => println!("model:    pulled"),
        Err(e @ JudgeError::ModelMissing { .. }) => {
            println!("model:    missing ({e}); rerun with --pull to fetch it");
            return Ok(EXIT_NOT_FOUND);
        }
        Err(e) => {
            println!("model:    unreachable ({e})");
            return Ok(EXIT_CONFIG_ERROR);
        }
    }
    Ok(EXIT_SUCCESS)
}
