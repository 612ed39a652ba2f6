//! In-memory staging/production store.
//!
//! Mirrors the SQLite implementation's semantics, including publish
//! atomicity, for tests and ephemeral runs. A fail-injection switch lets
//! coordinator tests exercise the publish failure path.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::{Result, ScoreError};
use crate::types::{GatingResult, JobType, RunRecord, RunStatus, ScoreResult};

use super::{GatingRow, StagingStore};

#[derive(Default)]
struct Inner {
    runs: HashMap<String, RunRecord>,
    staging_scores: HashMap<(String, String), ScoreResult>,
    staging_gating: HashMap<(String, String), GatingRow>,
    scores: HashMap<String, ScoreResult>,
    gating: HashMap<String, GatingRow>,
    fail_publish: bool,
}

/// In-memory [`StagingStore`] implementation.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `publish_run` fail without touching
    /// production. Test hook for the coordinator's failure handling.
    pub async fn set_fail_publish(&self, fail: bool) {
        self.inner.lock().await.fail_publish = fail;
    }

    fn require_running<'a>(inner: &'a mut Inner, run_id: &str) -> Result<&'a mut RunRecord> {
        let run = inner
            .runs
            .get_mut(run_id)
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

#[async_trait]
impl StagingStore for MemoryStore {
    async fn create_run(&self, run: &RunRecord) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.runs.insert(run.run_id.clone(), run.clone());
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner.runs.get(run_id).cloned())
    }

    async fn list_recent_runs(
        &self,
        market_scope: Option<&str>,
        job_type: Option<JobType>,
        limit: usize,
    ) -> Result<Vec<RunRecord>> {
        let inner = self.inner.lock().await;
        let mut runs: Vec<RunRecord> = inner
            .runs
            .values()
            .filter(|r| market_scope.map_or(true, |s| r.market_scope == s))
            .filter(|r| job_type.map_or(true, |j| r.job_type == j))
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit);
        Ok(runs)
    }

    async fn update_run_counters(
        &self,
        run_id: &str,
        processed: u64,
        succeeded: u64,
        failed: u64,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let run = Self::require_running(&mut inner, run_id)?;
        run.processed += processed;
        run.succeeded += succeeded;
        run.failed += failed;
        Ok(())
    }

    async fn finish_run(
        &self,
        run_id: &str,
        status: RunStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        Self::require_running(&mut inner, run_id)?;

        // Terminal runs keep no staging rows; they can never publish
        inner.staging_scores.retain(|(r, _), _| r != run_id);
        inner.staging_gating.retain(|(r, _), _| r != run_id);

        let run = Self::require_running(&mut inner, run_id)?;
        run.status = status;
        run.error = error.map(|e| e.to_string());
        run.finished_at = Some(Utc::now());
        Ok(())
    }

    async fn list_stale_running(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        let inner = self.inner.lock().await;
        let mut ids: Vec<(DateTime<Utc>, String)> = inner
            .runs
            .values()
            .filter(|r| r.status == RunStatus::Running && r.started_at < cutoff)
            .map(|r| (r.started_at, r.run_id.clone()))
            .collect();
        ids.sort();
        Ok(ids.into_iter().map(|(_, id)| id).collect())
    }

    async fn stage_score(&self, run_id: &str, result: &ScoreResult) -> Result<()> {
        let mut inner = self.inner.lock().await;
        Self::require_running(&mut inner, run_id)?;
        inner
            .staging_scores
            .insert((run_id.to_string(), result.asset_id.clone()), result.clone());
        Ok(())
    }

    async fn stage_gating(
        &self,
        run_id: &str,
        asset_id: &str,
        market_scope: &str,
        result: &GatingResult,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        Self::require_running(&mut inner, run_id)?;
        inner.staging_gating.insert(
            (run_id.to_string(), asset_id.to_string()),
            GatingRow {
                asset_id: asset_id.to_string(),
                market_scope: market_scope.to_string(),
                result: result.clone(),
            },
        );
        Ok(())
    }

    async fn staged_count(&self, run_id: &str) -> Result<usize> {
        let inner = self.inner.lock().await;
        let scores = inner
            .staging_scores
            .keys()
            .filter(|(r, _)| r == run_id)
            .count();
        let gating = inner
            .staging_gating
            .keys()
            .filter(|(r, _)| r == run_id)
            .count();
        Ok(scores + gating)
    }

    async fn publish_run(&self, run_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        Self::require_running(&mut inner, run_id)?;

        if inner.fail_publish {
            return Err(ScoreError::Publish {
                run_id: run_id.to_string(),
                message: "injected publish failure".to_string(),
            });
        }

        // Collect the staged set first so the swap below is all-or-nothing
        let staged_scores: Vec<ScoreResult> = inner
            .staging_scores
            .iter()
            .filter(|((r, _), _)| r == run_id)
            .map(|(_, v)| v.clone())
            .collect();
        let staged_gating: Vec<GatingRow> = inner
            .staging_gating
            .iter()
            .filter(|((r, _), _)| r == run_id)
            .map(|(_, v)| v.clone())
            .collect();

        for row in &staged_gating {
            if !row.result.eligible {
                inner.scores.remove(&row.asset_id);
            }
            inner.gating.insert(row.asset_id.clone(), row.clone());
        }
        for score in staged_scores {
            inner.scores.insert(score.asset_id.clone(), score);
        }

        inner.staging_scores.retain(|(r, _), _| r != run_id);
        inner.staging_gating.retain(|(r, _), _| r != run_id);

        let run = Self::require_running(&mut inner, run_id)?;
        run.status = RunStatus::Success;
        run.finished_at = Some(Utc::now());
        Ok(())
    }

    async fn discard_run(&self, run_id: &str, reason: Option<&str>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        Self::require_running(&mut inner, run_id)?;

        inner.staging_scores.retain(|(r, _), _| r != run_id);
        inner.staging_gating.retain(|(r, _), _| r != run_id);

        let run = Self::require_running(&mut inner, run_id)?;
        run.status = RunStatus::Cancelled;
        run.error = reason.map(|r| r.to_string());
        run.finished_at = Some(Utc::now());
        Ok(())
    }

    async fn get_score(&self, asset_id: &str) -> Result<Option<ScoreResult>> {
        let inner = self.inner.lock().await;
        Ok(inner.scores.get(asset_id).cloned())
    }

    async fn get_gating(&self, asset_id: &str) -> Result<Option<GatingRow>> {
        let inner = self.inner.lock().await;
        Ok(inner.gating.get(asset_id).cloned())
    }

    async fn list_scores(&self, market_scope: &str) -> Result<Vec<ScoreResult>> {
        let inner = self.inner.lock().await;
        let mut scores: Vec<ScoreResult> = inner
            .scores
            .values()
            .filter(|s| s.market_scope == market_scope)
            .cloned()
            .collect();
        scores.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(scores)
    }
}
