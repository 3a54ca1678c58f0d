//! Score extraction from raw judge output.
//!
//! Local models rarely return clean JSON. Extraction runs an ordered chain of
//! strategies; each either yields at least one criterion score or nothing, and
//! the first that yields wins. [`parse_scores`] never fails: when every
//! strategy comes up empty the result is [`EvaluationResult::SENTINEL`].

use crate::errors::FailureReason;
use crate::model::{Criterion, EvaluationOutcome, EvaluationResult, OVERALL_FIELD};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    /// The whole text is one JSON object.
    Strict,
    /// A JSON-ish object embedded in prose or fences, cleaned up if needed.
    Tolerant,
    /// `<criterion>_score: <number>` occurrences anywhere in the text.
    Pattern,
}

impl ExtractionStrategy {
    pub const CHAIN: [ExtractionStrategy; 3] = [Self::Strict, Self::Tolerant, Self::Pattern];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Tolerant => "tolerant",
            Self::Pattern => "pattern",
        }
    }

    fn extract(&self, text: &str) -> Option<RawScores> {
        let raw = match self {
            Self::Strict => strict(text),
            Self::Tolerant => tolerant(text),
            Self::Pattern => Some(pattern(text)),
        }?;
        raw.has_criterion().then_some(raw)
    }
}

/// Outcome of [`parse_scores`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedScores {
    pub result: EvaluationResult,
    /// `None` when nothing could be extracted.
    pub strategy: Option<ExtractionStrategy>,
    /// Criteria that defaulted to zero.
    pub missing: Vec<Criterion>,
}

impl ParsedScores {
    fn unparseable() -> Self {
        Self {
            result: EvaluationResult::SENTINEL,
            strategy: None,
            missing: Criterion::ALL.to_vec(),
        }
    }

    pub fn outcome(&self) -> EvaluationOutcome {
        match self.strategy {
            None => EvaluationOutcome::Degraded {
                reason: FailureReason::UnparseableOutput,
            },
            Some(_) if !self.missing.is_empty() => EvaluationOutcome::Partial {
                missing: self.missing.clone(),
            },
            Some(_) => EvaluationOutcome::Complete,
        }
    }
}

#[derive(Debug, Default)]
struct RawScores {
    criteria: [Option<f64>; 3],
    overall: Option<f64>,
}

impl RawScores {
    fn has_criterion(&self) -> bool {
        self.criteria.iter().any(Option::is_some)
    }

    fn set(&mut self, field: &str, value: f64) {
        if field == OVERALL_FIELD {
            self.overall = Some(value);
            return;
        }
        if let Some(i) = Criterion::ALL.iter().position(|c| c.field() == field) {
            self.criteria[i] = Some(value);
        }
    }
}

pub fn parse_scores(text: &str) -> ParsedScores {
    for strategy in ExtractionStrategy::CHAIN {
        if let Some(raw) = strategy.extract(text) {
            let missing = Criterion::ALL
                .iter()
                .zip(raw.criteria.iter())
                .filter(|(_, v)| v.is_none())
                .map(|(c, _)| *c)
                .collect();
            let [c, m, e] = raw.criteria;
            return ParsedScores {
                result: EvaluationResult::from_scores(
                    c.unwrap_or(0.0),
                    m.unwrap_or(0.0),
                    e.unwrap_or(0.0),
                    raw.overall,
                ),
                strategy: Some(strategy),
                missing,
            };
        }
    }
    ParsedScores::unparseable()
}

fn strict(text: &str) -> Option<RawScores> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(map)) => Some(from_object(&map)),
        _ => None,
    }
}

/// Fenced blocks first, then the whole text. Within each, every `{` is a
/// candidate start; the first object carrying a criterion wins.
fn tolerant(text: &str) -> Option<RawScores> {
    fence_re()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .chain(std::iter::once(text))
        .find_map(object_in)
}

fn object_in(body: &str) -> Option<RawScores> {
    body.match_indices('{')
        .find_map(|(start, _)| object_at(&body[start..]))
}

fn object_at(segment: &str) -> Option<RawScores> {
    // Valid JSON followed by anything: let the stream deserializer find its end.
    if let Some(Ok(Value::Object(map))) = serde_json::Deserializer::from_str(segment)
        .into_iter::<Value>()
        .next()
    {
        let raw = from_object(&map);
        if raw.has_criterion() {
            return Some(raw);
        }
    }

    let span = balanced_span(segment)?;
    let cleaned = clean(span);
    [strict(span), strict(&cleaned), strict(&requote(&cleaned))]
        .into_iter()
        .flatten()
        .find(RawScores::has_criterion)
}

/// The object starting at `segment[0]`, up to its matching `}`. Braces inside
/// quoted strings and comments do not count.
fn balanced_span(segment: &str) -> Option<&str> {
    let bytes = segment.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'"' | b'\'') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote && bytes[i] != b'\n' {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i += 1;
            }
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&segment[..=i]);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn pattern(text: &str) -> RawScores {
    let mut raw = RawScores::default();
    for caps in score_re().captures_iter(text) {
        let field = format!("{}_score", caps[1].to_ascii_lowercase());
        let already = match field.as_str() {
            OVERALL_FIELD => raw.overall.is_some(),
            _ => Criterion::ALL
                .iter()
                .position(|c| c.field() == field)
                .is_some_and(|i| raw.criteria[i].is_some()),
        };
        if already {
            continue;
        }
        if let Some(v) = caps[2].parse::<f64>().ok().filter(|v| v.is_finite()) {
            raw.set(&field, v);
        }
    }
    raw
}

fn from_object(map: &Map<String, Value>) -> RawScores {
    let mut raw = RawScores::default();
    for (key, value) in map {
        if let Some(v) = number_of(value) {
            raw.set(&key.to_ascii_lowercase(), v);
        }
    }
    raw
}

/// Numbers and numeric strings; anything non-finite is absent.
fn number_of(value: &Value) -> Option<f64> {
    let v = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    v.is_finite().then_some(v)
}

/// Drops comments and trailing commas.
fn clean(candidate: &str) -> String {
    let s = block_comment_re().replace_all(candidate, "");
    let s = line_comment_re().replace_all(&s, "$1");
    trailing_comma_re().replace_all(&s, "$1").into_owned()
}

/// Last resort: `'...'` spans become JSON strings. Corrupts valid strings that
/// hold apostrophes, so it only runs once everything else has failed.
fn requote(candidate: &str) -> String {
    single_quote_re().replace_all(candidate, "\"$1\"").into_owned()
}

macro_rules! static_regex {
    ($name:ident, $pattern:expr) => {
        fn $name() -> &'static Regex {
            static RE: OnceLock<Regex> = OnceLock::new();
            RE.get_or_init(|| Regex::new($pattern).expect("static pattern is valid"))
        }
    };
}

static_regex!(fence_re, r"(?s)```[A-Za-z]*\s*(.*?)```");
static_regex!(block_comment_re, r"(?s)/\*.*?\*/");
// Keeps `://` inside URLs intact.
static_regex!(line_comment_re, r"(?m)(^|[^:])//[^\n]*");
static_regex!(trailing_comma_re, r",\s*([}\]])");
static_regex!(single_quote_re, r"'([^'\n]*)'");
static_regex!(
    score_re,
    r#"(?i)"?(compliance|minimal_edits|example_usage|overall)_score"?\s*[:=]\s*"?(-?\d+(?:\.\d+)?)"#
);

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn strict_json_is_complete() {
        let parsed = parse_scores(
            r#"{"compliance_score": 8, "minimal_edits_score": 7, "example_usage_score": 9, "overall_score": 8}"#,
        );
        assert_eq!(parsed.strategy, Some(ExtractionStrategy::Strict));
        assert!(parsed.missing.is_empty());
        assert_eq!(parsed.outcome(), EvaluationOutcome::Complete);
        assert_eq!(
            parsed.result,
            EvaluationResult::from_scores(8.0, 7.0, 9.0, Some(8.0))
        );
    }

    #[test]
    fn prose_wrapped_json_with_comments_and_trailing_comma() {
        let text = r#"Here is my evaluation:
{
  "compliance_score": 12, // exceeds the range
  "minimal_edits_score": 6.5,
  /* judged against the example */
  "example_usage_score": '7',
}
Hope that helps."#;
        let parsed = parse_scores(text);
        assert_eq!(parsed.strategy, Some(ExtractionStrategy::Tolerant));
        assert_eq!(parsed.result.compliance_score, 10.0);
        assert_eq!(parsed.result.minimal_edits_score, 6.5);
        assert_eq!(parsed.result.example_usage_score, 7.0);
        assert!((parsed.result.overall_score - 23.5 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn fenced_json_is_unwrapped() {
        let text = "```json\n{\"compliance_score\": 4, \"minimal_edits_score\": 5, \"example_usage_score\": 6}\n```";
        let parsed = parse_scores(text);
        assert_eq!(parsed.strategy, Some(ExtractionStrategy::Tolerant));
        assert_eq!(parsed.result.overall_score, 5.0);
    }

    const QUOTED_NOTE: &str = r#"{"compliance_score":8,"minimal_edits_score":7,"example_usage_score":6,"overall_score":5,"note":"the party's notice isn't enough"}"#;

    #[test]
    fn apostrophes_in_values_survive_prose_wrapping() {
        let text = format!("Earlier draft had overall_score: 2.\n{QUOTED_NOTE}\nThat's all.");
        let parsed = parse_scores(&text);
        assert_eq!(parsed.strategy, Some(ExtractionStrategy::Tolerant));
        assert_eq!(
            parsed.result,
            EvaluationResult::from_scores(8.0, 7.0, 6.0, Some(5.0))
        );
    }

    #[test]
    fn braces_in_trailing_prose_are_ignored() {
        let text = format!("{QUOTED_NOTE}\n(format was {{x}})");
        let parsed = parse_scores(&text);
        assert_eq!(parsed.strategy, Some(ExtractionStrategy::Tolerant));
        assert_eq!(parsed.result.overall_score, 5.0);
    }

    #[test]
    fn braces_in_leading_prose_are_skipped() {
        let text = format!("Use the shape {{score}} as asked. overall_score: 1\n{QUOTED_NOTE}");
        let parsed = parse_scores(&text);
        assert_eq!(parsed.strategy, Some(ExtractionStrategy::Tolerant));
        assert_eq!(parsed.result.overall_score, 5.0);
    }

    #[test]
    fn later_fence_is_used_when_first_holds_no_scores() {
        let text = format!(
            "```text\nsee below, overall_score: 1\n```\n```json\n{QUOTED_NOTE}\n```"
        );
        let parsed = parse_scores(&text);
        assert_eq!(parsed.strategy, Some(ExtractionStrategy::Tolerant));
        assert_eq!(parsed.result.compliance_score, 8.0);
        assert_eq!(parsed.result.overall_score, 5.0);
    }

    #[test]
    fn single_quote_rewrite_is_a_last_resort() {
        let text = "Result: {'compliance_score': 4, 'minimal_edits_score': 5, 'example_usage_score': 6,}";
        let parsed = parse_scores(text);
        assert_eq!(parsed.strategy, Some(ExtractionStrategy::Tolerant));
        assert_eq!(parsed.result.overall_score, 5.0);
    }

    #[test]
    fn pattern_fallback_marks_missing_criteria() {
        let parsed = parse_scores("Compliance_Score: 9 but I could not judge the rest.");
        assert_eq!(parsed.strategy, Some(ExtractionStrategy::Pattern));
        assert_eq!(parsed.result.compliance_score, 9.0);
        assert_eq!(parsed.result.minimal_edits_score, 0.0);
        assert_eq!(parsed.result.example_usage_score, 0.0);
        assert_eq!(parsed.result.overall_score, 3.0);
        assert_eq!(
            parsed.outcome(),
            EvaluationOutcome::Partial {
                missing: vec![Criterion::MinimalEdits, Criterion::ExampleUsage]
            }
        );
    }

    #[test]
    fn numeric_strings_count_and_non_finite_do_not() {
        let parsed = parse_scores(
            r#"{"compliance_score": "7.5", "minimal_edits_score": "NaN", "example_usage_score": "inf"}"#,
        );
        assert_eq!(parsed.result.compliance_score, 7.5);
        assert_eq!(
            parsed.missing,
            vec![Criterion::MinimalEdits, Criterion::ExampleUsage]
        );
    }

    #[test]
    fn non_numeric_overall_falls_back_to_mean() {
        let parsed = parse_scores(
            r#"{"compliance_score": 3, "minimal_edits_score": 6, "example_usage_score": 9, "overall_score": "great"}"#,
        );
        assert_eq!(parsed.result.overall_score, 6.0);
    }

    #[test]
    fn garbage_yields_sentinel() {
        for text in ["", "I refuse to answer.", "{\"verdict\": \"good\"}", "{{{"] {
            let parsed = parse_scores(text);
            assert_eq!(parsed.strategy, None, "{text}");
            assert!(parsed.result.is_sentinel());
            assert_eq!(
                parsed.outcome(),
                EvaluationOutcome::Degraded {
                    reason: FailureReason::UnparseableOutput
                }
            );
        }
    }

    #[test]
    fn first_pattern_occurrence_wins() {
        let parsed = parse_scores("compliance_score = 2 ... later compliance_score = 9");
        assert_eq!(parsed.result.compliance_score, 2.0);
    }

    proptest! {
        #[test]
        fn any_text_yields_scores_in_range(text in ".{0,200}") {
            let r = parse_scores(&text).result;
            for v in [r.compliance_score, r.minimal_edits_score, r.example_usage_score, r.overall_score] {
                prop_assert!((0.0..=10.0).contains(&v));
            }
        }

        #[test]
        fn embedded_object_matches_its_strict_parse(
            prefix in "[a-zA-Z .,':]{0,40}",
            suffix in "[a-zA-Z .,':{}()]{0,40}",
        ) {
            let text = format!("{prefix}\n{QUOTED_NOTE}\n{suffix}");
            let parsed = parse_scores(&text);
            prop_assert_ne!(parsed.strategy, Some(ExtractionStrategy::Pattern));
            prop_assert_eq!(parsed.result, parse_scores(QUOTED_NOTE).result);
        }

        #[test]
        fn in_range_scores_pass_through(c in 0u8..=10, m in 0u8..=10, e in 0u8..=10) {
            let text = format!(
                r#"{{"compliance_score": {c}, "minimal_edits_score": {m}, "example_usage_score": {e}}}"#
            );
            let parsed = parse_scores(&text);
            prop_assert_eq!(parsed.result.compliance_score, f64::from(c));
            prop_assert_eq!(parsed.result.minimal_edits_score, f64::from(m));
            prop_assert_eq!(parsed.result.example_usage_score, f64::from(e));
            prop_assert!(parsed.missing.is_empty());
        }
    }
}
