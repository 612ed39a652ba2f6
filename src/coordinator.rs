//! Run lifecycle coordination.
//!
//! The coordinator owns run identity and the staging-to-production
//! handoff. Publishes for the same market scope are serialized through a
//! per-scope advisory lock so two concurrent runs cannot interleave their
//! promotion transactions; different scopes publish independently.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{Result, ScoreError};
use crate::store::StagingStore;
use crate::types::{GatingResult, JobType, RunRecord, RunStatus, ScoreResult};

/// Coordinates scoring runs over a staging store.
pub struct RunCoordinator<S: StagingStore> {
    store: Arc<S>,
    publish_locks: tokio::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S: StagingStore> RunCoordinator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            publish_locks: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Begin a new run for a market scope. Returns the run ID.
    pub async fn begin_run(&self, market_scope: &str, job_type: JobType) -> Result<String> {
        let run_id = Uuid::new_v4().to_string();
        let run = RunRecord {
            run_id: run_id.clone(),
            market_scope: market_scope.to_string(),
            job_type,
            status: RunStatus::Running,
            processed: 0,
            succeeded: 0,
            failed: 0,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        };
        self.store.create_run(&run).await?;
        info!(run_id = %run_id, market_scope, job_type = %job_type, "Run started");
        Ok(run_id)
    }

    /// Stage a score result into the run's isolated staging set.
    pub async fn stage_score(&self, run_id: &str, result: &ScoreResult) -> Result<()> {
        self.store.stage_score(run_id, result).await
    }

    /// Stage a gating verdict into the run's isolated staging set.
    pub async fn stage_gating(
        &self,
        run_id: &str,
        asset_id: &str,
        market_scope: &str,
        result: &GatingResult,
    ) -> Result<()> {
        self.store
            .stage_gating(run_id, asset_id, market_scope, result)
            .await
    }

    /// Record per-batch progress counters on the run.
    pub async fn record_progress(
        &self,
        run_id: &str,
        processed: u64,
        succeeded: u64,
        failed: u64,
    ) -> Result<()> {
        self.store
            .update_run_counters(run_id, processed, succeeded, failed)
            .await
    }

    /// Atomically publish the run's staged output to production.
    ///
    /// Acquires the advisory lock for the run's market scope before the
    /// store transaction, so concurrent publishes for the same scope queue
    /// up. On a store-level failure the run is marked failed and nothing
    /// reaches production.
    pub async fn publish(&self, run_id: &str) -> Result<()> {
        let run = self
            .store
            .get_run(run_id)
            .await?
            .ok_or_else(|| ScoreError::RunNotFound(run_id.to_string()))?;
        if run.status != RunStatus::Running {
            return Err(ScoreError::RunNotActive {
                run_id: run_id.to_string(),
                status: run.status,
            });
        }

        let scope_lock = self.scope_lock(&run.market_scope).await;
        let _guard = scope_lock.lock().await;

        let staged = self.store.staged_count(run_id).await?;
        match self.store.publish_run(run_id).await {
            Ok(()) => {
                info!(
                    run_id = %run_id,
                    market_scope = %run.market_scope,
                    staged,
                    "Run published to production"
                );
                Ok(())
            }
            Err(e) => {
                error!(run_id = %run_id, error = %e, "Publish failed, marking run failed");
                // Best effort; the run may already be terminal
                if let Err(mark_err) = self
                    .store
                    .finish_run(run_id, RunStatus::Failed, Some(&e.to_string()))
                    .await
                {
                    warn!(run_id = %run_id, error = %mark_err, "Could not mark run failed");
                }
                Err(ScoreError::Publish {
                    run_id: run_id.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// Discard a run's staged output and mark it cancelled.
    pub async fn rollback(&self, run_id: &str, reason: Option<&str>) -> Result<()> {
        self.store.discard_run(run_id, reason).await?;
        info!(run_id = %run_id, reason, "Run rolled back");
        Ok(())
    }

    /// Mark a run failed with an error message.
    pub async fn fail(&self, run_id: &str, error: &str) -> Result<()> {
        self.store
            .finish_run(run_id, RunStatus::Failed, Some(error))
            .await
    }

    /// Reclaim runs left `running` longer than `max_age_hours`, typically
    /// after a crash. Their staging rows are discarded; production is
    /// untouched. Returns the reclaimed run IDs.
    pub async fn reclaim_stale(&self, max_age_hours: i64) -> Result<Vec<String>> {
        let cutoff = Utc::now() - Duration::hours(max_age_hours);
        let stale = self.store.list_stale_running(cutoff).await?;

        let mut reclaimed = Vec::with_capacity(stale.len());
        for run_id in stale {
            let reason = format!("reclaimed after {max_age_hours}h without completion");
            match self.store.discard_run(&run_id, Some(&reason)).await {
                Ok(()) => {
                    warn!(run_id = %run_id, "Reclaimed stale run");
                    reclaimed.push(run_id);
                }
                // Lost a race with a concurrent finish; not an error
                Err(ScoreError::RunNotActive { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(reclaimed)
    }

    pub async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        self.store.get_run(run_id).await
    }

    pub async fn list_recent_runs(
        &self,
        market_scope: Option<&str>,
        job_type: Option<JobType>,
        limit: usize,
    ) -> Result<Vec<RunRecord>> {
        self.store.list_recent_runs(market_scope, job_type, limit).await
    }

    async fn scope_lock(&self, market_scope: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.publish_locks.lock().await;
        locks
            .entry(market_scope.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}
