//! Redline: score AI-generated contract edit suggestions with a local LLM judge.
//!
//! Pipeline per pair: [`corpus`] loads it, [`prompt`] renders the judge prompt,
//! [`judge`] calls the model, [`parse`] extracts scores and [`storage`] persists
//! the record. [`engine`] wires the middle three; [`batch`] drives a whole corpus.

pub mod batch;
pub mod config;
pub mod corpus;
pub mod engine;
pub mod errors;
pub mod judge;
pub mod model;
pub mod parse;
pub mod prompt;
pub mod storage;

pub use batch::{BatchHandle, BatchOrchestrator, BatchRun};
pub use config::{load_config, RedlineConfig};
pub use engine::{EvaluationService, Evaluator};
pub use storage::Store;
