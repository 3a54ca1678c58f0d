use crate::errors::FailureReason;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Lowest score a criterion can take.
pub const SCORE_MIN: f64 = 0.0;
/// Highest score a criterion can take.
pub const SCORE_MAX: f64 = 10.0;

/// Reference to a precedent document. Accepts `"abc"` or `{"id": "abc"}` on input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PrecedentIdWire")]
pub struct PrecedentId {
    pub id: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PrecedentIdWire {
    Bare(String),
    Object { id: String },
}

impl From<PrecedentIdWire> for PrecedentId {
    fn from(w: PrecedentIdWire) -> Self {
        match w {
            PrecedentIdWire::Bare(id) | PrecedentIdWire::Object { id } => Self { id },
        }
    }
}

impl From<&str> for PrecedentId {
    fn from(id: &str) -> Self {
        Self { id: id.to_string() }
    }
}

/// What the suggestion generator was asked to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionRequest {
    #[serde(rename = "precedentId", alias = "precedentIds", default)]
    pub precedent_ids: Vec<PrecedentId>,
    pub explanation: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "optional_text"
    )]
    pub rule: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "optional_text"
    )]
    pub example_language: Option<String>,
}

impl SuggestionRequest {
    pub fn new(explanation: impl Into<String>) -> Self {
        Self {
            precedent_ids: Vec::new(),
            explanation: explanation.into(),
            rule: None,
            example_language: None,
        }
    }

    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = normalize_text(Some(rule.into()));
        self
    }

    pub fn with_example_language(mut self, example: impl Into<String>) -> Self {
        self.example_language = normalize_text(Some(example.into()));
        self
    }

    pub fn with_precedent(mut self, id: impl Into<String>) -> Self {
        self.precedent_ids.push(PrecedentId { id: id.into() });
        self
    }

    /// True when the explanation carries no usable text.
    pub fn explanation_is_blank(&self) -> bool {
        is_blank_or_null(&self.explanation)
    }
}

/// What the suggestion generator produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionResponse {
    pub suggestions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_texts: Option<Vec<String>>,
}

impl SuggestionResponse {
    pub fn new(suggestions: Vec<String>) -> Self {
        Self {
            suggestions,
            original_texts: None,
        }
    }

    pub fn with_original_texts(mut self, texts: Vec<String>) -> Self {
        self.original_texts = Some(texts);
        self
    }
}

fn is_blank_or_null(s: &str) -> bool {
    let t = s.trim();
    t.is_empty() || t.eq_ignore_ascii_case("null")
}

fn normalize_text(value: Option<String>) -> Option<String> {
    value.filter(|s| !is_blank_or_null(s))
}

fn optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(normalize_text(Option::<String>::deserialize(deserializer)?))
}

/// The three judged criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Compliance,
    MinimalEdits,
    ExampleUsage,
}

impl Criterion {
    pub const ALL: [Criterion; 3] = [
        Criterion::Compliance,
        Criterion::MinimalEdits,
        Criterion::ExampleUsage,
    ];

    /// Field name used in judge output and persisted rows.
    pub fn field(&self) -> &'static str {
        match self {
            Self::Compliance => "compliance_score",
            Self::MinimalEdits => "minimal_edits_score",
            Self::ExampleUsage => "example_usage_score",
        }
    }
}

/// Field name of the aggregate score.
pub const OVERALL_FIELD: &str = "overall_score";

/// Four scores for one evaluated pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub compliance_score: f64,
    pub minimal_edits_score: f64,
    pub example_usage_score: f64,
    pub overall_score: f64,
}

impl EvaluationResult {
    /// All-zero result returned when nothing could be measured.
    pub const SENTINEL: EvaluationResult = EvaluationResult {
        compliance_score: 0.0,
        minimal_edits_score: 0.0,
        example_usage_score: 0.0,
        overall_score: 0.0,
    };

    /// Build a result from raw criterion scores. Every input is clamped to
    /// [`SCORE_MIN`, `SCORE_MAX`]; a missing `overall` is the mean of the three.
    pub fn from_scores(
        compliance: f64,
        minimal_edits: f64,
        example_usage: f64,
        overall: Option<f64>,
    ) -> Self {
        let compliance_score = clamp_score(compliance);
        let minimal_edits_score = clamp_score(minimal_edits);
        let example_usage_score = clamp_score(example_usage);
        let overall_score = match overall {
            Some(v) => clamp_score(v),
            None => (compliance_score + minimal_edits_score + example_usage_score) / 3.0,
        };
        Self {
            compliance_score,
            minimal_edits_score,
            example_usage_score,
            overall_score,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        *self == Self::SENTINEL
    }
}

/// Clamp into the score range. NaN maps to the lower bound.
pub fn clamp_score(v: f64) -> f64 {
    if v.is_nan() {
        return SCORE_MIN;
    }
    v.clamp(SCORE_MIN, SCORE_MAX)
}

/// How trustworthy an [`EvaluationResult`] is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EvaluationOutcome {
    /// All three criteria were extracted from the judge output.
    Complete,
    /// Some criteria were absent and defaulted to zero.
    Partial { missing: Vec<Criterion> },
    /// Nothing could be measured; the result is the sentinel.
    Degraded { reason: FailureReason },
}

impl EvaluationOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Complete => OutcomeKind::Complete,
            Self::Partial { .. } => OutcomeKind::Partial,
            Self::Degraded { .. } => OutcomeKind::Degraded,
        }
    }

    /// Human-readable detail stored next to the outcome label.
    pub fn detail(&self) -> Option<String> {
        match self {
            Self::Complete => None,
            Self::Partial { missing } => Some(format!(
                "missing: {}",
                missing
                    .iter()
                    .map(|c| c.field())
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
            Self::Degraded { reason } => Some(reason.as_str().to_string()),
        }
    }
}

/// Persisted outcome label. `Legacy` marks rows written before outcomes were tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Complete,
    Partial,
    Degraded,
    Legacy,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Partial => "partial",
            Self::Degraded => "degraded",
            Self::Legacy => "legacy",
        }
    }

    pub fn parse(s: Option<&str>) -> Self {
        match s {
            Some("complete") => Self::Complete,
            Some("partial") => Self::Partial,
            Some("degraded") => Self::Degraded,
            _ => Self::Legacy,
        }
    }
}

/// Engine output for one pair: the scores plus how they were obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub result: EvaluationResult,
    pub outcome: EvaluationOutcome,
    /// `sha256:<hex>` of the rendered prompt.
    pub prompt_digest: String,
}

impl Evaluation {
    pub fn is_degraded(&self) -> bool {
        matches!(self.outcome, EvaluationOutcome::Degraded { .. })
    }
}

/// A stored evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub id: i64,
    pub identifier: String,
    pub request: serde_json::Value,
    pub response: serde_json::Value,
    pub result: EvaluationResult,
    pub outcome: OutcomeKind,
    pub failure_reason: Option<String>,
    pub prompt_digest: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EvaluationRecord {
    /// Typed view of the stored request payload.
    pub fn suggestion_request(&self) -> serde_json::Result<SuggestionRequest> {
        serde_json::from_value(self.request.clone())
    }

    /// Typed view of the stored response payload.
    pub fn suggestion_response(&self) -> serde_json::Result<SuggestionResponse> {
        serde_json::from_value(self.response.clone())
    }
}
