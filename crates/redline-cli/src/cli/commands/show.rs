use super::open_store;
use super::output::record_text;
use crate::cli::args::{OutputFormat, ShowArgs};
use crate::exit_codes::{EXIT_NOT_FOUND, EXIT_SUCCESS};
use redline_core::RedlineConfig;

pub fn run(args: ShowArgs, cfg: &RedlineConfig) -> anyhow::Result<i32> {
    let Some(record) = open_store(cfg)?.get_by_id(args.id)? else {
        eprintln!("no evaluation with id {}", args.id);
        return Ok(EXIT_NOT_FOUND);
    };
    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&record)?),
        OutputFormat::Text => println!("{}", record_text(&record)),
    }
    Ok(EXIT_SUCCESS)
}
