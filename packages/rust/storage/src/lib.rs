//! libSQL-backed job ledger.
//!
//! The [`Ledger`] holds one row per vocabulary (the operator's job queue and
//! status sheet), the history of batch runs, and every job result recorded
//! during those runs. It can live in a local file or a remote libSQL
//! database.
//!
//! **Access rules:**
//! - batch runs and imports: read-write via [`Ledger::open`]
//! - inspection commands: read-only via [`Ledger::open_readonly`]

mod migrations;
pub mod tsv;

use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, params};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vocabsync_shared::{LedgerConfig, LedgerRow, Result, SheetUpdate, VocabError};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Counters of one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Rows that were processed or flagged.
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Rows left alone because they were not flagged ready.
    pub skipped: usize,
}

/// One entry of the run history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub id: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub stats: Option<RunStats>,
}

/// One recorded job result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResultRecord {
    pub run_id: String,
    pub position: usize,
    pub short_name: String,
    pub namespace: Option<String>,
    pub triple_count: Option<u64>,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub recorded_at: String,
}

fn storage_err(e: impl std::fmt::Display) -> VocabError {
    VocabError::Storage(e.to_string())
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Primary ledger handle wrapping a libSQL database.
pub struct Ledger {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Ledger {
    /// Open or create a local ledger at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| VocabError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        Self::from_database(db, false).await
    }

    /// Open a local ledger at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Open a remote libSQL ledger.
    pub async fn open_remote(url: &str, auth_token: &str) -> Result<Self> {
        let db = libsql::Builder::new_remote(url.to_string(), auth_token.to_string())
            .build()
            .await
            .map_err(storage_err)?;
        Self::from_database(db, false).await
    }

    /// Open the ledger described by `[ledger]`: the remote database when a
    /// URL is configured, otherwise the local file under `base_dir`.
    pub async fn open_configured(config: &LedgerConfig, base_dir: &Path, readonly: bool) -> Result<Self> {
        match (&config.url, &config.credentials) {
            (Some(url), Some(credentials)) => {
                let token = std::fs::read_to_string(credentials)
                    .map_err(|e| VocabError::io(credentials, e))?;
                tracing::info!(url = %url, "opening remote ledger");
                let mut ledger = Self::open_remote(url, token.trim()).await?;
                ledger.readonly = readonly;
                Ok(ledger)
            }
            (Some(_), None) => Err(VocabError::config(
                "ledger.url requires ledger.credentials",
            )),
            (None, _) => {
                let path = base_dir.join(&config.database);
                tracing::debug!(path = %path.display(), readonly, "opening local ledger");
                if readonly {
                    Self::open_readonly(&path).await
                } else {
                    Self::open(&path).await
                }
            }
        }
    }

    async fn from_database(db: Database, readonly: bool) -> Result<Self> {
        let conn = db.connect().map_err(storage_err)?;
        let ledger = Self { db, conn, readonly };
        ledger.run_migrations().await?;
        Ok(ledger)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    VocabError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(VocabError::Storage(
                "ledger is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Rows
    // -----------------------------------------------------------------------

    /// All rows in ledger order.
    pub async fn load_rows(&self) -> Result<Vec<LedgerRow>> {
        let mut rows = self
            .conn
            .query(
                "SELECT position, cells_json FROM ledger_rows ORDER BY position",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let position: i64 = row.get(0).map_err(storage_err)?;
            let cells_json: String = row.get(1).map_err(storage_err)?;
            let cells: Vec<String> = serde_json::from_str(&cells_json).map_err(|e| {
                VocabError::Storage(format!("row {position} has corrupt cells: {e}"))
            })?;
            results.push(LedgerRow::new(position as usize, cells));
        }
        Ok(results)
    }

    /// Insert or overwrite one row.
    pub async fn write_row(&self, row: &LedgerRow) -> Result<()> {
        self.check_writable()?;
        upsert_row(&self.conn, row).await
    }

    /// Insert or overwrite several rows in one transaction.
    pub async fn write_rows(&self, rows: &[LedgerRow]) -> Result<()> {
        self.check_writable()?;
        let tx = self.conn.transaction().await.map_err(storage_err)?;
        for row in rows {
            upsert_row(&tx, row).await?;
        }
        tx.commit().await.map_err(storage_err)?;
        tracing::debug!(rows = rows.len(), "ledger rows written");
        Ok(())
    }

    /// Replace the whole sheet with `rows`.
    pub async fn replace_rows(&self, rows: &[LedgerRow]) -> Result<()> {
        self.check_writable()?;
        let tx = self.conn.transaction().await.map_err(storage_err)?;
        tx.execute("DELETE FROM ledger_rows", params![])
            .await
            .map_err(storage_err)?;
        for row in rows {
            upsert_row(&tx, row).await?;
        }
        tx.commit().await.map_err(storage_err)?;
        tracing::info!(rows = rows.len(), "ledger replaced");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Start a new run. Returns the generated run ID.
    pub async fn insert_run(&self) -> Result<String> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO ingest_runs (id, started_at) VALUES (?1, ?2)",
                params![id.as_str(), now.as_str()],
            )
            .await
            .map_err(storage_err)?;
        Ok(id)
    }

    /// Close a run with its counters.
    pub async fn finish_run(&self, run_id: &str, stats: &RunStats) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let stats_json = serde_json::to_string(stats).map_err(storage_err)?;
        self.conn
            .execute(
                "UPDATE ingest_runs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![now.as_str(), stats_json.as_str(), run_id],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Most recent runs first.
    pub async fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, started_at, finished_at, stats_json FROM ingest_runs
                 ORDER BY started_at DESC, id DESC LIMIT ?1",
                params![limit as i64],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let stats_json: Option<String> = row.get(3).ok();
            results.push(RunRecord {
                id: row.get(0).map_err(storage_err)?,
                started_at: row.get(1).map_err(storage_err)?,
                finished_at: row.get(2).ok(),
                stats: stats_json.and_then(|s| serde_json::from_str(&s).ok()),
            });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Job results
    // -----------------------------------------------------------------------

    /// Append the outcome of one job to the run history.
    pub async fn record_job_result(
        &self,
        run_id: &str,
        position: usize,
        short_name: &str,
        update: &SheetUpdate,
    ) -> Result<()> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        let error_kind = update.error.as_ref().map(|e| e.kind());
        let error_message = update.error.as_ref().map(|e| e.message());
        self.conn
            .execute(
                "INSERT INTO job_results
                   (id, run_id, position, short_name, namespace, triple_count, error_kind, error_message, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    id.as_str(),
                    run_id,
                    position as i64,
                    short_name,
                    update.namespace.as_deref(),
                    update.triple_count.map(|c| c as i64),
                    error_kind,
                    error_message,
                    now.as_str(),
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Results recorded during one run, in ledger order.
    pub async fn list_job_results(&self, run_id: &str) -> Result<Vec<JobResultRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT run_id, position, short_name, namespace, triple_count, error_kind, error_message, recorded_at
                 FROM job_results WHERE run_id = ?1 ORDER BY position",
                params![run_id],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let position: i64 = row.get(1).map_err(storage_err)?;
            let triple_count: Option<i64> = row.get(4).ok();
            results.push(JobResultRecord {
                run_id: row.get(0).map_err(storage_err)?,
                position: position as usize,
                short_name: row.get(2).map_err(storage_err)?,
                namespace: row.get(3).ok(),
                triple_count: triple_count.map(|c| c as u64),
                error_kind: row.get(5).ok(),
                error_message: row.get(6).ok(),
                recorded_at: row.get(7).map_err(storage_err)?,
            });
        }
        Ok(results)
    }
}

async fn upsert_row(conn: &Connection, row: &LedgerRow) -> Result<()> {
    let cells_json = serde_json::to_string(&row.cells).map_err(storage_err)?;
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO ledger_rows (position, cells_json, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(position) DO UPDATE SET
           cells_json = excluded.cells_json,
           updated_at = excluded.updated_at",
        params![row.position as i64, cells_json.as_str(), now.as_str()],
    )
    .await
    .map_err(storage_err)?;
    Ok(())
}
