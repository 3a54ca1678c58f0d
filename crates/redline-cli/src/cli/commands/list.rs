use super::open_store;
use super::output::record_row;
use crate::cli::args::{ListArgs, OutputFormat};
use crate::exit_codes::EXIT_SUCCESS;
use redline_core::RedlineConfig;

pub fn run(args: ListArgs, cfg: &RedlineConfig) -> anyhow::Result<i32> {
    let records = open_store(cfg)?.list_all()?;
    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
        OutputFormat::Text => {
            if records.is_empty() {
                println!("no evaluations stored");
            }
            for r in &records {
                println!("{}", record_row(r));
            }
        }
    }
    Ok(EXIT_SUCCESS)
}
