use crate::errors::{StoreError, StoreResult};
use crate::model::{EvaluationRecord, EvaluationResult, OutcomeKind};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::Row;

pub(crate) const SELECT_COLUMNS: &str = "id, request_id, request, response, \
     compliance_score, minimal_edits_score, example_usage_score, overall_score, \
     created_at, updated_at, outcome, failure_reason, prompt_digest";

/// Column values as SQLite hands them back, before validation.
pub(crate) struct RawRow {
    id: i64,
    identifier: Option<String>,
    request: Option<String>,
    response: Option<String>,
    scores: [Option<f64>; 4],
    created_at: Option<String>,
    updated_at: Option<String>,
    outcome: Option<String>,
    failure_reason: Option<String>,
    prompt_digest: Option<String>,
}

impl RawRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            identifier: row.get(1)?,
            request: row.get(2)?,
            response: row.get(3)?,
            scores: [row.get(4)?, row.get(5)?, row.get(6)?, row.get(7)?],
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
            outcome: row.get(10)?,
            failure_reason: row.get(11)?,
            prompt_digest: row.get(12)?,
        })
    }

    pub(crate) fn into_record(self) -> StoreResult<EvaluationRecord> {
        let id = self.id;
        let corrupt = |reason: &str| StoreError::Corrupt {
            id,
            reason: reason.to_string(),
        };

        let identifier = self.identifier.ok_or_else(|| corrupt("missing request_id"))?;
        let created_at = self
            .created_at
            .as_deref()
            .and_then(parse_timestamp)
            .ok_or_else(|| corrupt("unreadable created_at"))?;
        let updated_at = match self.updated_at.as_deref() {
            None => created_at,
            Some(raw) => parse_timestamp(raw).ok_or_else(|| corrupt("unreadable updated_at"))?,
        };
        let [c, m, e, o] = self.scores.map(|s| s.unwrap_or(0.0));

        Ok(EvaluationRecord {
            id,
            identifier,
            request: payload(self.request),
            response: payload(self.response),
            result: EvaluationResult {
                compliance_score: c,
                minimal_edits_score: m,
                example_usage_score: e,
                overall_score: o,
            },
            outcome: OutcomeKind::parse(self.outcome.as_deref()),
            failure_reason: self.failure_reason,
            prompt_digest: self.prompt_digest,
            created_at,
            updated_at,
        })
    }
}

/// Stored payloads are JSON text; anything else is kept verbatim as a string.
fn payload(raw: Option<String>) -> serde_json::Value {
    match raw {
        None => serde_json::Value::Null,
        Some(s) => serde_json::from_str(&s).unwrap_or(serde_json::Value::String(s)),
    }
}

pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// RFC 3339, or the naive local-less forms older releases wrote.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
