use redline_core::errors::FailureReason;
use redline_core::model::{
    Evaluation, EvaluationOutcome, EvaluationResult, OutcomeKind, SuggestionRequest,
    SuggestionResponse,
};
use redline_core::Store;
use rusqlite::Connection;

fn pair() -> (SuggestionRequest, SuggestionResponse) {
    let req = SuggestionRequest::new("missing clause")
        .with_precedent("p-1")
        .with_rule("must include termination clause")
        .with_example_language("Either party may terminate with 30 days notice.");
    let resp = SuggestionResponse::new(vec![
        "Either party may terminate this agreement with 30 days written notice.".into(),
    ])
    .with_original_texts(vec!["This agreement has no termination provision.".into()]);
    (req, resp)
}

fn complete(score: f64) -> Evaluation {
    Evaluation {
        result: EvaluationResult::from_scores(score, score, score, None),
        outcome: EvaluationOutcome::Complete,
        prompt_digest: "sha256:abc".into(),
    }
}

#[test]
fn upsert_is_idempotent_per_identifier() {
    let store = Store::memory().unwrap();
    let (req, resp) = pair();

    let first = store.upsert("pair-1", &req, &resp, &complete(4.0)).unwrap();
    let before = store.get_by_id(first).unwrap().unwrap();
    let second = store.upsert("pair-1", &req, &resp, &complete(8.0)).unwrap();
    let after = store.get_by_id(second).unwrap().unwrap();

    assert_eq!(first, second);
    assert_eq!(store.count().unwrap(), 1);
    assert_eq!(after.result.overall_score, 8.0);
    assert_eq!(after.created_at, before.created_at);
    assert!(after.updated_at > before.updated_at);
}

#[test]
fn repeated_rapid_updates_keep_advancing() {
    let store = Store::memory().unwrap();
    let (req, resp) = pair();
    let mut last = None;
    for i in 0..20 {
        store
            .upsert("pair-1", &req, &resp, &complete(f64::from(i % 10)))
            .unwrap();
        let rec = store.get_by_identifier("pair-1").unwrap().unwrap();
        if let Some(prev) = last {
            assert!(rec.updated_at > prev);
        }
        last = Some(rec.updated_at);
    }
}

#[test]
fn records_round_trip_payloads_and_outcome() {
    let store = Store::memory().unwrap();
    let (req, resp) = pair();
    let degraded = Evaluation {
        result: EvaluationResult::SENTINEL,
        outcome: EvaluationOutcome::Degraded {
            reason: FailureReason::JudgeTimeout,
        },
        prompt_digest: "sha256:def".into(),
    };
    let id = store.upsert("pair-9", &req, &resp, &degraded).unwrap();

    let rec = store.get_by_id(id).unwrap().unwrap();
    assert_eq!(rec.identifier, "pair-9");
    assert_eq!(rec.suggestion_request().unwrap(), req);
    assert_eq!(rec.suggestion_response().unwrap(), resp);
    assert_eq!(rec.outcome, OutcomeKind::Degraded);
    assert_eq!(rec.failure_reason.as_deref(), Some("judge_timeout"));
    assert_eq!(rec.prompt_digest.as_deref(), Some("sha256:def"));
    assert!(rec.result.is_sentinel());
}

#[test]
fn list_all_is_in_creation_order() {
    let store = Store::memory().unwrap();
    let (req, resp) = pair();
    for id in ["c", "a", "b"] {
        store.upsert(id, &req, &resp, &complete(5.0)).unwrap();
    }
    // Updating an early record does not move it.
    store.upsert("c", &req, &resp, &complete(9.0)).unwrap();

    let ids: Vec<_> = store
        .list_all()
        .unwrap()
        .into_iter()
        .map(|r| r.identifier)
        .collect();
    assert_eq!(ids, vec!["c", "a", "b"]);
}

#[test]
fn unknown_id_is_none() {
    let store = Store::memory().unwrap();
    assert!(store.get_by_id(42).unwrap().is_none());
    assert!(store.get_by_identifier("nope").unwrap().is_none());
}

#[test]
fn open_creates_parent_directory_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("evaluations.db");
    let (req, resp) = pair();
    {
        let store = Store::open(&path).unwrap();
        store.upsert("pair-1", &req, &resp, &complete(6.0)).unwrap();
    }
    let reopened = Store::open(&path).unwrap();
    assert_eq!(reopened.count().unwrap(), 1);
}

#[test]
fn legacy_database_is_migrated_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("evaluations.db");
    {
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE evaluations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                request_id TEXT,
                request JSON,
                response JSON,
                compliance_score REAL,
                minimal_edits_score REAL,
                example_usage_score REAL,
                overall_score REAL,
                created_at TIMESTAMP
            );
            INSERT INTO evaluations (
                request_id, request, response,
                compliance_score, minimal_edits_score, example_usage_score, overall_score,
                created_at
            ) VALUES (
                'legacy-1',
                '{"precedentId": [{"id": "p-1"}], "explanation": "why", "rule": "null"}',
                '{"suggestions": ["s"]}',
                7.0, 6.0, 5.0, 6.2,
                '2024-05-01T09:15:00.123456'
            );
            "#,
        )
        .unwrap();
    }

    let store = Store::open(&path).unwrap();
    let rec = store.get_by_identifier("legacy-1").unwrap().unwrap();
    assert_eq!(rec.outcome, OutcomeKind::Legacy);
    assert_eq!(rec.updated_at, rec.created_at);
    assert_eq!(rec.result.overall_score, 6.2);
    assert_eq!(rec.suggestion_request().unwrap().rule, None);

    let (req, resp) = pair();
    let id = store.upsert("legacy-1", &req, &resp, &complete(9.0)).unwrap();
    assert_eq!(id, rec.id);
    let updated = store.get_by_id(id).unwrap().unwrap();
    assert_eq!(updated.created_at, rec.created_at);
    assert!(updated.updated_at > rec.updated_at);
    assert_eq!(updated.outcome, OutcomeKind::Complete);
}

#[test]
fn concurrent_writers_to_one_identifier_leave_one_consistent_row() {
    let store = Store::memory().unwrap();
    let (_, resp) = pair();

    std::thread::scope(|scope| {
        for writer in 0..8u32 {
            let store = store.clone();
            let resp = resp.clone();
            scope.spawn(move || {
                let req = SuggestionRequest::new(format!("writer-{writer}"));
                let eval = Evaluation {
                    prompt_digest: format!("sha256:{writer}"),
                    ..complete(f64::from(writer))
                };
                for _ in 0..5 {
                    store.upsert("shared", &req, &resp, &eval).unwrap();
                }
            });
        }
    });

    assert_eq!(store.count().unwrap(), 1);
    let rec = store.get_by_identifier("shared").unwrap().unwrap();
    let writer = rec.result.compliance_score as u32;
    assert!(writer < 8);
    assert_eq!(rec.request["explanation"], format!("writer-{writer}"));
    assert_eq!(rec.prompt_digest, Some(format!("sha256:{writer}")));
    let w = f64::from(writer);
    assert_eq!(rec.result, EvaluationResult::from_scores(w, w, w, None));
    assert!(rec.updated_at > rec.created_at);
}
