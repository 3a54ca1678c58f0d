//! SQLite evaluation store.
//!
//! One row per identifier. Every write goes through [`Store::upsert`], which
//! runs in a single `BEGIN IMMEDIATE` transaction, so readers see either the
//! prior row or the new one and never a mix.

mod records;
mod schema;

use crate::errors::{StoreError, StoreResult};
use crate::model::{Evaluation, EvaluationRecord, SuggestionRequest, SuggestionResponse};
use chrono::{DateTime, Utc};
use records::{format_timestamp, parse_timestamp, RawRow, SELECT_COLUMNS};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

#[derive(Clone)]
pub struct Store {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    /// Open (or create) the database at `path` and bring its schema current.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        debug!(path = %path.display(), "evaluation store opened");
        Ok(store)
    }

    pub fn memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn init_schema(&self) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(schema::DDL)?;
        schema::migrate(&conn)?;
        Ok(())
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Insert or overwrite the record for `identifier`, returning its row id.
    ///
    /// `created_at` survives overwrites; `updated_at` is strictly later than the
    /// value it replaces.
    pub fn upsert(
        &self,
        identifier: &str,
        request: &SuggestionRequest,
        response: &SuggestionResponse,
        evaluation: &Evaluation,
    ) -> StoreResult<i64> {
        let request_json = serde_json::to_string(request)?;
        let response_json = serde_json::to_string(response)?;
        let conn = self.lock()?;

        conn.execute("BEGIN IMMEDIATE", [])?;
        let result = upsert_inner(
            &conn,
            identifier,
            &request_json,
            &response_json,
            evaluation,
        );
        match &result {
            Ok(_) => {
                // A failed COMMIT leaves the transaction open.
                if let Err(e) = conn.execute("COMMIT", []) {
                    let _ = conn.execute("ROLLBACK", []);
                    return Err(e.into());
                }
            }
            Err(_) => {
                let _ = conn.execute("ROLLBACK", []);
            }
        }
        result
    }

    /// Every record, oldest first.
    pub fn list_all(&self) -> StoreResult<Vec<EvaluationRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM evaluations ORDER BY id ASC",
            SELECT_COLUMNS
        ))?;
        let rows = stmt.query_map([], RawRow::from_row)?;

        let mut out = Vec::new();
        for r in rows {
            out.push(r?.into_record()?);
        }
        Ok(out)
    }

    pub fn get_by_id(&self, id: i64) -> StoreResult<Option<EvaluationRecord>> {
        self.fetch_one("id = ?1", params![id])
    }

    pub fn get_by_identifier(&self, identifier: &str) -> StoreResult<Option<EvaluationRecord>> {
        self.fetch_one("request_id = ?1", params![identifier])
    }

    pub fn count(&self) -> StoreResult<u64> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM evaluations", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    fn fetch_one(
        &self,
        predicate: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> StoreResult<Option<EvaluationRecord>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {} FROM evaluations WHERE {}",
                    SELECT_COLUMNS, predicate
                ),
                params,
                RawRow::from_row,
            )
            .optional()?;
        raw.map(RawRow::into_record).transpose()
    }
}

fn upsert_inner(
    conn: &Connection,
    identifier: &str,
    request_json: &str,
    response_json: &str,
    evaluation: &Evaluation,
) -> StoreResult<i64> {
    let existing: Option<(i64, Option<String>, Option<String>)> = conn
        .query_row(
            "SELECT id, created_at, updated_at FROM evaluations WHERE request_id = ?1",
            params![identifier],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    let r = &evaluation.result;
    let outcome = evaluation.outcome.kind().as_str();
    let detail = evaluation.outcome.detail();
    let now = Utc::now();

    match existing {
        Some((id, created_at, updated_at)) => {
            let previous = updated_at.or(created_at).as_deref().and_then(parse_timestamp);
            let updated = next_timestamp(now, previous);
            conn.execute(
                "UPDATE evaluations SET
                    request = ?1, response = ?2,
                    compliance_score = ?3, minimal_edits_score = ?4,
                    example_usage_score = ?5, overall_score = ?6,
                    updated_at = ?7, outcome = ?8, failure_reason = ?9, prompt_digest = ?10
                 WHERE id = ?11",
                params![
                    request_json,
                    response_json,
                    r.compliance_score,
                    r.minimal_edits_score,
                    r.example_usage_score,
                    r.overall_score,
                    format_timestamp(updated),
                    outcome,
                    detail,
                    evaluation.prompt_digest,
                    id
                ],
            )?;
            debug!(identifier, id, "evaluation updated");
            Ok(id)
        }
        None => {
            let ts = format_timestamp(now);
            conn.execute(
                "INSERT INTO evaluations (
                    request_id, request, response,
                    compliance_score, minimal_edits_score, example_usage_score, overall_score,
                    created_at, updated_at, outcome, failure_reason, prompt_digest
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, ?9, ?10, ?11)",
                params![
                    identifier,
                    request_json,
                    response_json,
                    r.compliance_score,
                    r.minimal_edits_score,
                    r.example_usage_score,
                    r.overall_score,
                    ts,
                    outcome,
                    detail,
                    evaluation.prompt_digest
                ],
            )?;
            let id = conn.last_insert_rowid();
            debug!(identifier, id, "evaluation created");
            Ok(id)
        }
    }
}

/// `now`, bumped past `previous` when the clock has not moved far enough.
fn next_timestamp(now: DateTime<Utc>, previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    match previous {
        Some(prev) if now <= prev => prev + chrono::Duration::microseconds(1),
        _ => now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EvaluationOutcome, EvaluationResult};
    use chrono::TimeZone;

    #[test]
    fn next_timestamp_is_strictly_later() {
        let t = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let earlier = t - chrono::Duration::seconds(5);
        assert!(next_timestamp(earlier, Some(t)) > t);
        assert_eq!(next_timestamp(t, Some(earlier)), t);
        assert_eq!(next_timestamp(t, None), t);
    }

    #[test]
    fn failed_write_keeps_prior_row() {
        let store = Store::memory().unwrap();
        let req = SuggestionRequest::new("why");
        let resp = SuggestionResponse::new(vec!["s".into()]);
        let eval = Evaluation {
            result: EvaluationResult::from_scores(7.0, 7.0, 7.0, None),
            outcome: EvaluationOutcome::Complete,
            prompt_digest: "sha256:00".into(),
        };
        let id = store.upsert("pair-1", &req, &resp, &eval).unwrap();

        // A trigger that aborts updates simulates a mid-write failure.
        store
            .conn
            .lock()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER block_updates BEFORE UPDATE ON evaluations
                 BEGIN SELECT RAISE(ABORT, 'blocked'); END;",
            )
            .unwrap();

        let worse = Evaluation {
            result: EvaluationResult::SENTINEL,
            ..eval.clone()
        };
        assert!(store.upsert("pair-1", &req, &resp, &worse).is_err());

        let rec = store.get_by_id(id).unwrap().unwrap();
        assert_eq!(rec.result.compliance_score, 7.0);
        assert_eq!(store.count().unwrap(), 1);

        // The connection is usable again after the rollback.
        assert!(store.upsert("pair-2", &req, &resp, &eval).is_ok());
    }

    #[test]
    fn failed_commit_rolls_back_and_releases_the_connection() {
        let store = Store::memory().unwrap();
        let req = SuggestionRequest::new("why");
        let resp = SuggestionResponse::new(vec!["s".into()]);
        let eval = Evaluation {
            result: EvaluationResult::from_scores(5.0, 5.0, 5.0, None),
            outcome: EvaluationOutcome::Complete,
            prompt_digest: "sha256:00".into(),
        };

        // Deferred foreign keys are only checked at COMMIT.
        store
            .conn
            .lock()
            .unwrap()
            .execute_batch(
                "PRAGMA foreign_keys = ON;
                 CREATE TABLE parents (id INTEGER PRIMARY KEY);
                 CREATE TABLE children (
                     parent INTEGER REFERENCES parents(id) DEFERRABLE INITIALLY DEFERRED
                 );
                 CREATE TRIGGER orphan_child AFTER INSERT ON evaluations
                 WHEN NEW.request_id = 'doomed'
                 BEGIN INSERT INTO children VALUES (42); END;",
            )
            .unwrap();

        let err = store.upsert("doomed", &req, &resp, &eval).unwrap_err();
        assert!(err.to_string().contains("FOREIGN KEY"), "{err}");
        assert!(store.conn.lock().unwrap().is_autocommit());
        assert!(store.get_by_identifier("doomed").unwrap().is_none());

        let id = store.upsert("pair-1", &req, &resp, &eval).unwrap();
        assert_eq!(store.get_by_id(id).unwrap().unwrap().identifier, "pair-1");
        assert_eq!(store.count().unwrap(), 1);
    }
}
