//! SQLite-backed staging/production store.
//!
//! Single connection in WAL mode behind a tokio `Mutex` (rusqlite's
//! `Connection` is Send but not Sync). Staging rows carry both queryable
//! columns and the full payload as JSON; the publish step promotes them to
//! production inside one IMMEDIATE transaction.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, TransactionBehavior};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Result, ScoreError};
use crate::types::{GatingResult, JobType, RunRecord, RunStatus, ScoreResult};

use super::{GatingRow, StagingStore};

const CREATE_TABLES_SQL: &str = r#"
-- Run bookkeeping
CREATE TABLE IF NOT EXISTS runs (
    run_id TEXT PRIMARY KEY,
    market_scope TEXT NOT NULL,
    job_type TEXT NOT NULL,
    status TEXT NOT NULL,
    processed INTEGER NOT NULL DEFAULT 0,
    succeeded INTEGER NOT NULL DEFAULT 0,
    failed INTEGER NOT NULL DEFAULT 0,
    error TEXT,
    started_at TEXT NOT NULL,
    finished_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_runs_scope_started
ON runs(market_scope, started_at DESC);

CREATE INDEX IF NOT EXISTS idx_runs_status
ON runs(status);

-- Staged score results, isolated per run
CREATE TABLE IF NOT EXISTS staging_scores (
    run_id TEXT NOT NULL,
    asset_id TEXT NOT NULL,
    market_scope TEXT NOT NULL,
    raw_score REAL NOT NULL,
    final_score REAL NOT NULL,
    confidence REAL NOT NULL,
    liquidity_tier TEXT NOT NULL,
    payload TEXT NOT NULL,
    staged_at TEXT NOT NULL,
    UNIQUE(run_id, asset_id)
);

-- Staged gating verdicts, isolated per run
CREATE TABLE IF NOT EXISTS staging_gating (
    run_id TEXT NOT NULL,
    asset_id TEXT NOT NULL,
    market_scope TEXT NOT NULL,
    eligible INTEGER NOT NULL,
    payload TEXT NOT NULL,
    staged_at TEXT NOT NULL,
    UNIQUE(run_id, asset_id)
);

-- Production tables, mutated only by the publish transaction
CREATE TABLE IF NOT EXISTS scores (
    asset_id TEXT PRIMARY KEY,
    market_scope TEXT NOT NULL,
    raw_score REAL NOT NULL,
    final_score REAL NOT NULL,
    confidence REAL NOT NULL,
    liquidity_tier TEXT NOT NULL,
    payload TEXT NOT NULL,
    published_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_scores_scope_final
ON scores(market_scope, final_score DESC);

CREATE TABLE IF NOT EXISTS gating (
    asset_id TEXT PRIMARY KEY,
    market_scope TEXT NOT NULL,
    eligible INTEGER NOT NULL,
    payload TEXT NOT NULL,
    published_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_gating_scope
ON gating(market_scope);
"#;

/// Configuration for the SQLite store.
#[derive(Debug, Clone)]
pub struct SqliteStoreConfig {
    /// Path to the database file
    pub db_path: PathBuf,
}

/// SQLite staging/production store.
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at the configured path.
    pub fn open(config: SqliteStoreConfig) -> Result<Self> {
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ScoreError::Config(format!("cannot create db directory: {e}")))?;
        }

        let conn = Connection::open(&config.db_path)?;
        Self::init(conn, Some(&config.db_path))
    }

    /// Open an in-memory database. Useful for tests and ephemeral runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<&PathBuf>) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(CREATE_TABLES_SQL)?;

        match path {
            Some(p) => info!(db_path = %p.display(), "Opened score store"),
            None => debug!("Opened in-memory score store"),
        }

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<RunRecord> {
        let job_type_str: String = row.get(2)?;
        let status_str: String = row.get(3)?;
        let started_str: String = row.get(8)?;
        let finished_str: Option<String> = row.get(9)?;

        Ok(RunRecord {
            run_id: row.get(0)?,
            market_scope: row.get(1)?,
            job_type: job_type_str
                .parse()
                .map_err(|e: String| text_column_error(2, e))?,
            status: status_str
                .parse()
                .map_err(|e: String| text_column_error(3, e))?,
            processed: row.get::<_, i64>(4)? as u64,
            succeeded: row.get::<_, i64>(5)? as u64,
            failed: row.get::<_, i64>(6)? as u64,
            error: row.get(7)?,
            started_at: parse_utc(&started_str)
                .map_err(|e| text_column_error(8, e.to_string()))?,
            finished_at: finished_str
                .as_deref()
                .map(parse_utc)
                .transpose()
                .map_err(|e| text_column_error(9, e.to_string()))?,
        })
    }

    /// Fetch a run inside an already-held connection lock.
    fn get_run_locked(conn: &Connection, run_id: &str) -> Result<Option<RunRecord>> {
        let mut stmt = conn.prepare(
            "SELECT run_id, market_scope, job_type, status, processed, succeeded, failed,
                    error, started_at, finished_at
             FROM runs WHERE run_id = ?1",
        )?;
        let mut rows = stmt.query_map(params![run_id], Self::row_to_run)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    fn require_running(conn: &Connection, run_id: &str) -> Result<RunRecord> {
        let run = Self::get_run_locked(conn, run_id)?
            .ok_or_else(|| ScoreError::RunNotFound(run_id.to_string()))?;
        if run.status != RunStatus::Running {
            return Err(ScoreError::RunNotActive {
                run_id: run_id.to_string(),
                status: run.status,
            });
        }
        Ok(run)
    }
}

fn parse_utc(s: &str) -> chrono::ParseResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

// Corrupt rows surface as storage errors instead of silently defaulting
fn text_column_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, message.into())
}

#[async_trait]
impl StagingStore for SqliteStore {
    async fn create_run(&self, run: &RunRecord) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            r#"
            INSERT INTO runs
            (run_id, market_scope, job_type, status, processed, succeeded, failed, error, started_at, finished_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                run.run_id,
                run.market_scope,
                run.job_type.to_string(),
                run.status.to_string(),
                run.processed as i64,
                run.succeeded as i64,
                run.failed as i64,
                run.error,
                run.started_at.to_rfc3339(),
                run.finished_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        let db = self.db.lock().await;
        Self::get_run_locked(&db, run_id)
    }

    async fn list_recent_runs(
        &self,
        market_scope: Option<&str>,
        job_type: Option<JobType>,
        limit: usize,
    ) -> Result<Vec<RunRecord>> {
        let db = self.db.lock().await;

        let mut sql = String::from(
            "SELECT run_id, market_scope, job_type, status, processed, succeeded, failed,
                    error, started_at, finished_at
             FROM runs WHERE 1=1",
        );
        if market_scope.is_some() {
            sql.push_str(" AND market_scope = :scope");
        }
        if job_type.is_some() {
            sql.push_str(" AND job_type = :job_type");
        }
        sql.push_str(" ORDER BY started_at DESC LIMIT :limit");

        let mut stmt = db.prepare(&sql)?;
        let job_type_str = job_type.map(|j| j.to_string());
        let limit_i64 = limit as i64;

        let mut named: Vec<(&str, &dyn rusqlite::ToSql)> = vec![(":limit", &limit_i64)];
        if let Some(ref scope) = market_scope {
            named.push((":scope", scope));
        }
        if let Some(ref jt) = job_type_str {
            named.push((":job_type", jt));
        }

        let rows = stmt.query_map(named.as_slice(), Self::row_to_run)?;
        let mut runs = Vec::new();
        for row in rows {
            runs.push(row?);
        }
        Ok(runs)
    }

    async fn update_run_counters(
        &self,
        run_id: &str,
        processed: u64,
        succeeded: u64,
        failed: u64,
    ) -> Result<()> {
        let db = self.db.lock().await;
        Self::require_running(&db, run_id)?;
        db.execute(
            "UPDATE runs
             SET processed = processed + ?2, succeeded = succeeded + ?3, failed = failed + ?4
             WHERE run_id = ?1 AND status = 'running'",
            params![run_id, processed as i64, succeeded as i64, failed as i64],
        )?;
        Ok(())
    }

    async fn finish_run(
        &self,
        run_id: &str,
        status: RunStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let mut db = self.db.lock().await;
        Self::require_running(&db, run_id)?;

        // Terminal runs keep no staging rows; they can never publish
        let tx = db.transaction()?;
        tx.execute(
            "UPDATE runs SET status = ?2, error = ?3, finished_at = ?4
             WHERE run_id = ?1 AND status = 'running'",
            params![run_id, status.to_string(), error, Utc::now().to_rfc3339()],
        )?;
        tx.execute(
            "DELETE FROM staging_scores WHERE run_id = ?1",
            params![run_id],
        )?;
        tx.execute(
            "DELETE FROM staging_gating WHERE run_id = ?1",
            params![run_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn list_stale_running(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT run_id FROM runs WHERE status = 'running' AND started_at < ?1
             ORDER BY started_at ASC",
        )?;
        let rows = stmt.query_map(params![cutoff.to_rfc3339()], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    async fn stage_score(&self, run_id: &str, result: &ScoreResult) -> Result<()> {
        let db = self.db.lock().await;
        Self::require_running(&db, run_id)?;

        let payload = serde_json::to_string(result)?;
        db.execute(
            r#"
            INSERT INTO staging_scores
            (run_id, asset_id, market_scope, raw_score, final_score, confidence, liquidity_tier, payload, staged_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(run_id, asset_id) DO UPDATE SET
                market_scope = excluded.market_scope,
                raw_score = excluded.raw_score,
                final_score = excluded.final_score,
                confidence = excluded.confidence,
                liquidity_tier = excluded.liquidity_tier,
                payload = excluded.payload,
                staged_at = excluded.staged_at
            "#,
            params![
                run_id,
                result.asset_id,
                result.market_scope,
                result.raw_score,
                result.final_score,
                result.confidence,
                result.liquidity_tier.to_string(),
                payload,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn stage_gating(
        &self,
        run_id: &str,
        asset_id: &str,
        market_scope: &str,
        result: &GatingResult,
    ) -> Result<()> {
        let db = self.db.lock().await;
        Self::require_running(&db, run_id)?;

        let payload = serde_json::to_string(result)?;
        db.execute(
            r#"
            INSERT INTO staging_gating
            (run_id, asset_id, market_scope, eligible, payload, staged_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(run_id, asset_id) DO UPDATE SET
                market_scope = excluded.market_scope,
                eligible = excluded.eligible,
                payload = excluded.payload,
                staged_at = excluded.staged_at
            "#,
            params![
                run_id,
                asset_id,
                market_scope,
                result.eligible as i64,
                payload,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn staged_count(&self, run_id: &str) -> Result<usize> {
        let db = self.db.lock().await;
        let scores: i64 = db.query_row(
            "SELECT COUNT(*) FROM staging_scores WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        let gating: i64 = db.query_row(
            "SELECT COUNT(*) FROM staging_gating WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok((scores + gating) as usize)
    }

    async fn publish_run(&self, run_id: &str) -> Result<()> {
        let mut db = self.db.lock().await;
        Self::require_running(&db, run_id)?;

        let now = Utc::now().to_rfc3339();
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // (a) delete production rows for instruments in this run's staging set
        tx.execute(
            "DELETE FROM scores WHERE asset_id IN
             (SELECT asset_id FROM staging_scores WHERE run_id = ?1)",
            params![run_id],
        )?;
        // Instruments gated out this run lose any previously published score
        tx.execute(
            "DELETE FROM scores WHERE asset_id IN
             (SELECT asset_id FROM staging_gating WHERE run_id = ?1 AND eligible = 0)",
            params![run_id],
        )?;
        tx.execute(
            "DELETE FROM gating WHERE asset_id IN
             (SELECT asset_id FROM staging_gating WHERE run_id = ?1)",
            params![run_id],
        )?;

        // (b) promote staged rows
        tx.execute(
            "INSERT INTO scores
             (asset_id, market_scope, raw_score, final_score, confidence, liquidity_tier, payload, published_at)
             SELECT asset_id, market_scope, raw_score, final_score, confidence, liquidity_tier, payload, ?2
             FROM staging_scores WHERE run_id = ?1",
            params![run_id, now],
        )?;
        tx.execute(
            "INSERT INTO gating
             (asset_id, market_scope, eligible, payload, published_at)
             SELECT asset_id, market_scope, eligible, payload, ?2
             FROM staging_gating WHERE run_id = ?1",
            params![run_id, now],
        )?;

        // (c) mark the run successful
        tx.execute(
            "UPDATE runs SET status = 'success', finished_at = ?2
             WHERE run_id = ?1 AND status = 'running'",
            params![run_id, now],
        )?;

        // (d) clear the staging set
        tx.execute(
            "DELETE FROM staging_scores WHERE run_id = ?1",
            params![run_id],
        )?;
        tx.execute(
            "DELETE FROM staging_gating WHERE run_id = ?1",
            params![run_id],
        )?;

        tx.commit()?;
        debug!(run_id, "Published run to production");
        Ok(())
    }

    async fn discard_run(&self, run_id: &str, reason: Option<&str>) -> Result<()> {
        let mut db = self.db.lock().await;
        Self::require_running(&db, run_id)?;

        let tx = db.transaction()?;
        tx.execute(
            "DELETE FROM staging_scores WHERE run_id = ?1",
            params![run_id],
        )?;
        tx.execute(
            "DELETE FROM staging_gating WHERE run_id = ?1",
            params![run_id],
        )?;
        tx.execute(
            "UPDATE runs SET status = 'cancelled', error = ?2, finished_at = ?3
             WHERE run_id = ?1 AND status = 'running'",
            params![run_id, reason, Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;
        debug!(run_id, reason, "Discarded run staging");
        Ok(())
    }

    async fn get_score(&self, asset_id: &str) -> Result<Option<ScoreResult>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare("SELECT payload FROM scores WHERE asset_id = ?1")?;
        let mut rows = stmt.query_map(params![asset_id], |row| row.get::<_, String>(0))?;
        match rows.next() {
            Some(payload) => Ok(Some(serde_json::from_str(&payload?)?)),
            None => Ok(None),
        }
    }

    async fn get_gating(&self, asset_id: &str) -> Result<Option<GatingRow>> {
        let db = self.db.lock().await;
        let mut stmt =
            db.prepare("SELECT asset_id, market_scope, payload FROM gating WHERE asset_id = ?1")?;
        let mut rows = stmt.query_map(params![asset_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        match rows.next() {
            Some(row) => {
                let (asset_id, market_scope, payload) = row?;
                Ok(Some(GatingRow {
                    asset_id,
                    market_scope,
                    result: serde_json::from_str(&payload)?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn list_scores(&self, market_scope: &str) -> Result<Vec<ScoreResult>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT payload FROM scores WHERE market_scope = ?1 ORDER BY final_score DESC",
        )?;
        let rows = stmt.query_map(params![market_scope], |row| row.get::<_, String>(0))?;
        let mut scores = Vec::new();
        for row in rows {
            scores.push(serde_json::from_str(&row?)?);
        }
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LiquidityTier;

    fn make_run(run_id: &str, scope: &str) -> RunRecord {
        RunRecord {
            run_id: run_id.to_string(),
            market_scope: scope.to_string(),
            job_type: JobType::Score,
            status: RunStatus::Running,
            processed: 0,
            succeeded: 0,
            failed: 0,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    fn make_score(asset_id: &str, scope: &str, final_score: f64) -> ScoreResult {
        ScoreResult {
            asset_id: asset_id.to_string(),
            market_scope: scope.to_string(),
            raw_score: final_score,
            final_score,
            confidence: 90.0,
            liquidity_tier: LiquidityTier::A,
            caps_applied: vec![],
            min_recommended_horizon_years: 10,
            pillars: vec![],
            scored_at: Utc::now(),
        }
    }

    fn make_gating(eligible: bool) -> GatingResult {
        GatingResult {
            eligible,
            reason: (!eligible).then(|| "coverage 0.20 below minimum 0.70".to_string()),
            coverage: Some(if eligible { 0.95 } else { 0.2 }),
            stale_ratio: Some(0.05),
            liquidity_usd: Some(1_000_000.0),
            last_bar_date: None,
            data_confidence: 80.0,
        }
    }

    #[tokio::test]
    async fn test_run_lifecycle() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_run(&make_run("r1", "US")).await.unwrap();

        let run = store.get_run("r1").await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Running);

        store.update_run_counters("r1", 10, 8, 2).await.unwrap();
        let run = store.get_run("r1").await.unwrap().unwrap();
        assert_eq!(run.processed, 10);
        assert_eq!(run.succeeded, 8);
        assert_eq!(run.failed, 2);

        store
            .finish_run("r1", RunStatus::Failed, Some("boom"))
            .await
            .unwrap();
        let run = store.get_run("r1").await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error.as_deref(), Some("boom"));
        assert!(run.finished_at.is_some());

        // Terminal state can't be re-entered
        let err = store.finish_run("r1", RunStatus::Success, None).await;
        assert!(matches!(err, Err(ScoreError::RunNotActive { .. })));
    }

    #[tokio::test]
    async fn test_stage_idempotent_upsert() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_run(&make_run("r1", "US")).await.unwrap();

        store
            .stage_score("r1", &make_score("AAPL.US", "US", 70.0))
            .await
            .unwrap();
        store
            .stage_score("r1", &make_score("AAPL.US", "US", 85.0))
            .await
            .unwrap();

        assert_eq!(store.staged_count("r1").await.unwrap(), 1);

        // Latest value wins after publish
        store.publish_run("r1").await.unwrap();
        let score = store.get_score("AAPL.US").await.unwrap().unwrap();
        assert!((score.final_score - 85.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_publish_atomic_promotion() {
        let store = SqliteStore::open_in_memory().unwrap();

        // Seed production through a first run
        store.create_run(&make_run("r1", "US")).await.unwrap();
        store
            .stage_score("r1", &make_score("AAPL.US", "US", 70.0))
            .await
            .unwrap();
        store
            .stage_gating("r1", "AAPL.US", "US", &make_gating(true))
            .await
            .unwrap();
        store.publish_run("r1").await.unwrap();

        // Second run updates AAPL and adds MSFT
        store.create_run(&make_run("r2", "US")).await.unwrap();
        store
            .stage_score("r2", &make_score("AAPL.US", "US", 80.0))
            .await
            .unwrap();
        store
            .stage_score("r2", &make_score("MSFT.US", "US", 75.0))
            .await
            .unwrap();
        store.publish_run("r2").await.unwrap();

        let aapl = store.get_score("AAPL.US").await.unwrap().unwrap();
        let msft = store.get_score("MSFT.US").await.unwrap().unwrap();
        assert!((aapl.final_score - 80.0).abs() < f64::EPSILON);
        assert!((msft.final_score - 75.0).abs() < f64::EPSILON);

        // Staging cleared, run successful
        assert_eq!(store.staged_count("r2").await.unwrap(), 0);
        let run = store.get_run("r2").await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Success);
    }

    #[tokio::test]
    async fn test_publish_untouched_instruments_survive() {
        let store = SqliteStore::open_in_memory().unwrap();

        store.create_run(&make_run("r1", "US")).await.unwrap();
        store
            .stage_score("r1", &make_score("AAPL.US", "US", 70.0))
            .await
            .unwrap();
        store.publish_run("r1").await.unwrap();

        // A later run touching only MSFT leaves AAPL alone
        store.create_run(&make_run("r2", "US")).await.unwrap();
        store
            .stage_score("r2", &make_score("MSFT.US", "US", 60.0))
            .await
            .unwrap();
        store.publish_run("r2").await.unwrap();

        let aapl = store.get_score("AAPL.US").await.unwrap().unwrap();
        assert!((aapl.final_score - 70.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_ineligible_gating_removes_production_score() {
        let store = SqliteStore::open_in_memory().unwrap();

        store.create_run(&make_run("r1", "US")).await.unwrap();
        store
            .stage_score("r1", &make_score("XYZ.US", "US", 65.0))
            .await
            .unwrap();
        store
            .stage_gating("r1", "XYZ.US", "US", &make_gating(true))
            .await
            .unwrap();
        store.publish_run("r1").await.unwrap();
        assert!(store.get_score("XYZ.US").await.unwrap().is_some());

        // Next run gates the instrument out; its stale score must not survive
        store.create_run(&make_run("r2", "US")).await.unwrap();
        store
            .stage_gating("r2", "XYZ.US", "US", &make_gating(false))
            .await
            .unwrap();
        store.publish_run("r2").await.unwrap();

        assert!(store.get_score("XYZ.US").await.unwrap().is_none());
        let gate = store.get_gating("XYZ.US").await.unwrap().unwrap();
        assert!(!gate.result.eligible);
    }

    #[tokio::test]
    async fn test_publish_terminal_run_rejected_and_production_unchanged() {
        let store = SqliteStore::open_in_memory().unwrap();

        store.create_run(&make_run("r1", "US")).await.unwrap();
        store
            .stage_score("r1", &make_score("AAPL.US", "US", 70.0))
            .await
            .unwrap();
        store.publish_run("r1").await.unwrap();

        // A cancelled run cannot publish over production
        store.create_run(&make_run("r2", "US")).await.unwrap();
        store
            .stage_score("r2", &make_score("AAPL.US", "US", 5.0))
            .await
            .unwrap();
        store.discard_run("r2", Some("operator abort")).await.unwrap();

        let err = store.publish_run("r2").await;
        assert!(matches!(err, Err(ScoreError::RunNotActive { .. })));

        let aapl = store.get_score("AAPL.US").await.unwrap().unwrap();
        assert!((aapl.final_score - 70.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_finish_run_clears_staging() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_run(&make_run("r1", "US")).await.unwrap();
        store
            .stage_score("r1", &make_score("AAPL.US", "US", 70.0))
            .await
            .unwrap();
        store
            .stage_gating("r1", "AAPL.US", "US", &make_gating(true))
            .await
            .unwrap();
        assert_eq!(store.staged_count("r1").await.unwrap(), 2);

        store
            .finish_run("r1", RunStatus::Failed, Some("publish blew up"))
            .await
            .unwrap();

        // A failed run keeps no staging rows and nothing reached production
        assert_eq!(store.staged_count("r1").await.unwrap(), 0);
        assert!(store.get_score("AAPL.US").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_discard_clears_staging() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_run(&make_run("r1", "US")).await.unwrap();
        store
            .stage_score("r1", &make_score("AAPL.US", "US", 70.0))
            .await
            .unwrap();
        assert_eq!(store.staged_count("r1").await.unwrap(), 1);

        store.discard_run("r1", Some("rolled back")).await.unwrap();
        assert_eq!(store.staged_count("r1").await.unwrap(), 0);

        let run = store.get_run("r1").await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Cancelled);
        assert!(store.get_score("AAPL.US").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_recent_runs_filters() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_run(&make_run("r1", "US")).await.unwrap();
        store.create_run(&make_run("r2", "LSE")).await.unwrap();
        let mut gating_run = make_run("r3", "US");
        gating_run.job_type = JobType::Gating;
        store.create_run(&gating_run).await.unwrap();

        let all = store.list_recent_runs(None, None, 10).await.unwrap();
        assert_eq!(all.len(), 3);

        let us = store.list_recent_runs(Some("US"), None, 10).await.unwrap();
        assert_eq!(us.len(), 2);

        let us_gating = store
            .list_recent_runs(Some("US"), Some(JobType::Gating), 10)
            .await
            .unwrap();
        assert_eq!(us_gating.len(), 1);
        assert_eq!(us_gating[0].run_id, "r3");
    }

    #[tokio::test]
    async fn test_list_stale_running() {
        let store = SqliteStore::open_in_memory().unwrap();

        let mut old_run = make_run("old", "US");
        old_run.started_at = Utc::now() - chrono::Duration::hours(48);
        store.create_run(&old_run).await.unwrap();
        store.create_run(&make_run("fresh", "US")).await.unwrap();

        let cutoff = Utc::now() - chrono::Duration::hours(24);
        let stale = store.list_stale_running(cutoff).await.unwrap();
        assert_eq!(stale, vec!["old".to_string()]);
    }

    #[tokio::test]
    async fn test_corrupt_run_row_surfaces_storage_error() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_run(&make_run("r1", "US")).await.unwrap();
        store.create_run(&make_run("r2", "US")).await.unwrap();

        {
            let db = store.db.lock().await;
            db.execute(
                "UPDATE runs SET status = 'exploded' WHERE run_id = 'r1'",
                [],
            )
            .unwrap();
            db.execute(
                "UPDATE runs SET started_at = 'not-a-timestamp' WHERE run_id = 'r2'",
                [],
            )
            .unwrap();
        }

        // An unrecognized status must not be coerced to a default
        let err = store.get_run("r1").await;
        assert!(matches!(err, Err(ScoreError::Storage(_))));

        // A malformed timestamp must not be replaced with the current time
        let err = store.get_run("r2").await;
        assert!(matches!(err, Err(ScoreError::Storage(_))));
    }

    #[tokio::test]
    async fn test_on_disk_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let config = SqliteStoreConfig {
            db_path: dir.path().join("scores.db"),
        };
        let store = SqliteStore::open(config).unwrap();

        store.create_run(&make_run("r1", "US")).await.unwrap();
        store
            .stage_score("r1", &make_score("AAPL.US", "US", 70.0))
            .await
            .unwrap();
        store.publish_run("r1").await.unwrap();

        let scores = store.list_scores("US").await.unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].asset_id, "AAPL.US");
    }
}
