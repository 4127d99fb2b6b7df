//! SQL migration definitions for the ledger database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: ledger_rows, ingest_runs",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per vocabulary, cells stored as a JSON array in sheet order
CREATE TABLE IF NOT EXISTS ledger_rows (
    position   INTEGER PRIMARY KEY,
    cells_json TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Batch run history
CREATE TABLE IF NOT EXISTS ingest_runs (
    id          TEXT PRIMARY KEY,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    stats_json  TEXT
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Per-job result history",
            sql: r#"
CREATE TABLE IF NOT EXISTS job_results (
    id            TEXT PRIMARY KEY,
    run_id        TEXT NOT NULL REFERENCES ingest_runs(id) ON DELETE CASCADE,
    position      INTEGER NOT NULL,
    short_name    TEXT NOT NULL,
    namespace     TEXT,
    triple_count  INTEGER,
    error_kind    TEXT,
    error_message TEXT,
    recorded_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_job_results_run ON job_results(run_id);
CREATE INDEX IF NOT EXISTS idx_job_results_position ON job_results(position);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
