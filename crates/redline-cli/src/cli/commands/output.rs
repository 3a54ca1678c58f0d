use redline_core::model::{Evaluation, EvaluationRecord, EvaluationResult};

pub(crate) fn scores_line(r: &EvaluationResult) -> String {
    format!(
        "compliance {:.1}  minimal_edits {:.1}  example_usage {:.1}  overall {:.2}",
        r.compliance_score, r.minimal_edits_score, r.example_usage_score, r.overall_score
    )
}

pub(crate) fn evaluation_text(identifier: Option<&str>, record_id: Option<i64>, e: &Evaluation) -> String {
    let mut out = String::new();
    if let Some(id) = identifier {
        out.push_str(&format!("identifier: {}\n", id));
    }
    if let Some(id) = record_id {
        out.push_str(&format!("record:     {}\n", id));
    }
    out.push_str(&format!("outcome:    {}", e.outcome.kind().as_str()));
    if let Some(detail) = e.outcome.detail() {
        out.push_str(&format!(" ({})", detail));
    }
    out.push('\n');
    out.push_str(&format!("scores:     {}", scores_line(&e.result)));
    out
}

pub(crate) fn record_row(r: &EvaluationRecord) -> String {
    format!(
        "{:>5}  {:<38}  {:>5.2}  {:<8}  {}",
        r.id,
        r.identifier,
        r.result.overall_score,
        r.outcome.as_str(),
        r.updated_at.to_rfc3339()
    )
}

pub(crate) fn record_text(r: &EvaluationRecord) -> String {
    let mut out = format!(
        "record:     {}\nidentifier: {}\noutcome:    {}",
        r.id,
        r.identifier,
        r.outcome.as_str()
    );
    if let Some(reason) = &r.failure_reason {
        out.push_str(&format!(" ({})", reason));
    }
    out.push_str(&format!("\nscores:     {}", scores_line(&r.result)));
    out.push_str(&format!("\ncreated:    {}", r.created_at.to_rfc3339()));
    out.push_str(&format!("\nupdated:    {}", r.updated_at.to_rfc3339()));
    if let Some(digest) = &r.prompt_digest {
        out.push_str(&format!("\nprompt:     {}", digest));
    }
    out
}
