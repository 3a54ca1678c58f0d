//! Judge prompt rendering.
//!
//! Rendering is pure: the same template and pair always give byte-identical
//! prompts, so any variance in scores comes from the model.

use crate::config::PromptConfig;
use crate::errors::PromptError;
use crate::model::{SuggestionRequest, SuggestionResponse};
use regex::{Captures, Regex};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

pub const BUILTIN_TEMPLATE: &str = include_str!("../templates/evaluation_prompt.txt");

pub const NO_RULE: &str = "No rule provided";
pub const NO_EXAMPLE_LANGUAGE: &str = "No example language provided";
pub const NO_ORIGINAL_TEXTS: &str = "No original texts provided";
pub const NO_SUGGESTIONS: &str = "No suggestions provided";

const PLACEHOLDERS: [&str; 5] = [
    "rule",
    "explanation",
    "example_language",
    "original_texts",
    "suggestions",
];

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{(rule|explanation|example_language|original_texts|suggestions)\}")
            .expect("placeholder pattern is valid")
    })
}

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    template: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PromptBuilder {
    pub fn builtin() -> Self {
        Self {
            template: BUILTIN_TEMPLATE.to_string(),
        }
    }

    /// Use a custom template. Every placeholder must appear at least once.
    pub fn from_template(template: impl Into<String>) -> Result<Self, PromptError> {
        let template = template.into();
        for placeholder in PLACEHOLDERS {
            if !template.contains(&format!("{{{}}}", placeholder)) {
                return Err(PromptError::MissingPlaceholder { placeholder });
            }
        }
        Ok(Self { template })
    }

    pub fn from_config(cfg: &PromptConfig) -> Result<Self, PromptError> {
        match &cfg.template_path {
            None => Ok(Self::builtin()),
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| PromptError::Read {
                    path: path.clone(),
                    source,
                })?;
                Self::from_template(raw)
            }
        }
    }

    pub fn render(&self, request: &SuggestionRequest, response: &SuggestionResponse) -> String {
        let rule = request.rule.as_deref().unwrap_or(NO_RULE);
        let example = request
            .example_language
            .as_deref()
            .unwrap_or(NO_EXAMPLE_LANGUAGE);
        let originals = match response.original_texts.as_deref() {
            Some(texts) if !texts.is_empty() => numbered("Text", texts),
            _ => NO_ORIGINAL_TEXTS.to_string(),
        };
        let suggestions = if response.suggestions.is_empty() {
            NO_SUGGESTIONS.to_string()
        } else {
            numbered("Suggestion", &response.suggestions)
        };

        // Single pass: substituted values are never rescanned for placeholders.
        placeholder_re()
            .replace_all(&self.template, |caps: &Captures<'_>| match &caps[1] {
                "rule" => rule.to_string(),
                "explanation" => request.explanation.clone(),
                "example_language" => example.to_string(),
                "original_texts" => originals.clone(),
                _ => suggestions.clone(),
            })
            .into_owned()
    }
}

fn numbered(label: &str, items: &[String]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, text)| format!("{} {}: {}", label, i + 1, text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `sha256:<hex>` of a rendered prompt.
pub fn prompt_digest(prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    format!("sha256:{}", hex::encode(hasher.finalize()))
}
