//! Table layout and additive migrations.
//!
//! The base table matches databases written by earlier releases, which had no
//! outcome tracking and only a `created_at` timestamp. Newer columns are added
//! in place when missing.

use crate::errors::StoreResult;
use rusqlite::Connection;
use std::collections::HashSet;

pub(crate) const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS evaluations (
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
"#;

pub(crate) fn migrate(conn: &Connection) -> StoreResult<()> {
    let cols = get_columns(conn, "evaluations")?;
    add_column_if_missing(conn, &cols, "evaluations", "updated_at", "TIMESTAMP")?;
    add_column_if_missing(conn, &cols, "evaluations", "outcome", "TEXT")?;
    add_column_if_missing(conn, &cols, "evaluations", "failure_reason", "TEXT")?;
    add_column_if_missing(conn, &cols, "evaluations", "prompt_digest", "TEXT")?;

    // Fails on legacy databases holding duplicate identifiers; those need a
    // manual dedupe before this release can open them.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_evaluations_request_id ON evaluations(request_id)",
        [],
    )?;
    Ok(())
}

pub(crate) fn get_columns(conn: &Connection, table: &str) -> StoreResult<HashSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut out = HashSet::new();
    for r in rows {
        out.insert(r?);
    }
    Ok(out)
}

fn add_column_if_missing(
    conn: &Connection,
    cols: &HashSet<String>,
    table: &str,
    col: &str,
    ty: &str,
) -> StoreResult<()> {
    if !cols.contains(col) {
        let sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, col, ty);
        conn.execute(&sql, [])?;
    }
    Ok(())
}
