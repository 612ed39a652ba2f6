//! Staging/production score storage.
//!
//! The pipeline writes all run output into an isolated staging area keyed
//! by run ID, then promotes it to the production tables in one atomic
//! publish transaction. Readers only ever see production; staging rows are
//! promoted or discarded, never served.
//!
//! The [`StagingStore`] trait is the seam that keeps the coordinator
//! store-agnostic: the SQLite implementation backs deployments, the
//! in-memory implementation backs tests and failure injection.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{SqliteStore, SqliteStoreConfig};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{GatingResult, JobType, RunRecord, RunStatus, ScoreResult};

/// A production gating row: the verdict plus its instrument key.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GatingRow {
    pub asset_id: String,
    pub market_scope: String,
    pub result: GatingResult,
}

/// Transactional staging/production store for scoring runs.
///
/// Contracts every implementation must uphold:
/// - `stage_*` is an idempotent upsert keyed by `(run_id, asset_id)`;
///   staging the same key twice leaves one row with the latest value.
/// - `publish_run` atomically replaces production rows for exactly the
///   instruments in the run's staging set, marks the run `success`, and
///   clears the staging set. On failure production is unchanged.
/// - Terminal run states are never re-entered.
#[async_trait]
pub trait StagingStore: Send + Sync {
    // === Run records ===

    async fn create_run(&self, run: &RunRecord) -> Result<()>;

    async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>>;

    /// Recent runs, newest first, optionally filtered by scope and job type.
    async fn list_recent_runs(
        &self,
        market_scope: Option<&str>,
        job_type: Option<JobType>,
        limit: usize,
    ) -> Result<Vec<RunRecord>>;

    /// Add to a running run's counters. Errors if the run is not running.
    async fn update_run_counters(
        &self,
        run_id: &str,
        processed: u64,
        succeeded: u64,
        failed: u64,
    ) -> Result<()>;

    /// Move a running run into a terminal state and discard its staging
    /// rows: a terminal run can never publish, so keeping them would leak.
    /// Errors with [`crate::error::ScoreError::RunNotActive`] if the run
    /// already is terminal.
    async fn finish_run(&self, run_id: &str, status: RunStatus, error: Option<&str>)
        -> Result<()>;

    /// Run IDs still `running` that started before `cutoff`.
    async fn list_stale_running(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>>;

    // === Staging ===

    async fn stage_score(&self, run_id: &str, result: &ScoreResult) -> Result<()>;

    async fn stage_gating(
        &self,
        run_id: &str,
        asset_id: &str,
        market_scope: &str,
        result: &GatingResult,
    ) -> Result<()>;

    /// Number of staged rows (scores + gating) for a run.
    async fn staged_count(&self, run_id: &str) -> Result<usize>;

    // === Promotion ===

    /// The atomic publish transaction: replace production rows for the
    /// run's staged instruments, mark the run `success`, delete the
    /// staging set. All or nothing.
    async fn publish_run(&self, run_id: &str) -> Result<()>;

    /// Discard the run's staging rows and mark it `cancelled`.
    async fn discard_run(&self, run_id: &str, reason: Option<&str>) -> Result<()>;

    // === Production readers ===

    async fn get_score(&self, asset_id: &str) -> Result<Option<ScoreResult>>;

    async fn get_gating(&self, asset_id: &str) -> Result<Option<GatingRow>>;

    /// All production scores for a market scope, highest final score first.
    async fn list_scores(&self, market_scope: &str) -> Result<Vec<ScoreResult>>;
}
