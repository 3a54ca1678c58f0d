use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "redline",
    version,
    about = "Score AI-generated contract edit suggestions with a local LLM judge"
)]
pub struct Cli {
    /// Config file (default: redline.yaml, optional)
    #[arg(long, global = true, env = "REDLINE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Evaluate one request/response pair
    Evaluate(EvaluateArgs),
    /// Evaluate every pair in a corpus directory
    Batch(BatchArgs),
    /// List stored evaluations, oldest first
    List(ListArgs),
    /// Show one stored evaluation
    Show(ShowArgs),
    /// Check the model server and model
    Doctor(DoctorArgs),
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(clap::Args, Debug, Clone)]
pub struct EvaluateArgs {
    /// Suggestion request JSON file
    #[arg(long)]
    pub request: PathBuf,

    /// Suggestion response JSON file
    #[arg(long)]
    pub response: PathBuf,

    /// Identifier to store under (default: a fresh UUID)
    #[arg(long)]
    pub id: Option<String>,

    /// Print the scores without writing to the database
    #[arg(long)]
    pub no_store: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(clap::Args, Debug, Clone)]
pub struct BatchArgs {
    /// Corpus directory (overrides corpus.dir)
    #[arg(long)]
    pub corpus: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ListArgs {
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ShowArgs {
    /// Record id
    pub id: i64,

    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,
}

#[derive(clap::Args, Debug, Clone)]
pub struct DoctorArgs {
    /// Pull the model if it is not present
    #[arg(long)]
    pub pull: bool,
}
