//! Scoring engine: gate, feature, score, guard, stage.
//!
//! Drives a full run over a batch of instruments. Instrument-level
//! failures are recorded and skipped; only storage failures abort the run.
//! All output goes through the coordinator's staging path and reaches
//! production in a single publish at the end of the batch.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::composer;
use crate::confidence;
use crate::config::{PillarParams, PillarWeights, ScoringConfig};
use crate::coordinator::RunCoordinator;
use crate::error::{Result, ScoreError};
use crate::features::{Bar, PriceFeatures};
use crate::gating::{GateSignals, GatingEvaluator};
use crate::guard::{GuardSignals, InstitutionalGuard};
use crate::pillars;
use crate::store::StagingStore;
use crate::types::{GatingResult, Instrument, JobType, RawAttributes, ScoreResult};

/// Everything the engine needs to process one instrument.
#[derive(Debug, Clone)]
pub struct InstrumentInput {
    pub instrument: Instrument,
    /// Time-ascending daily bars for the lookback window
    pub bars: Vec<Bar>,
    /// Bars the trading calendar would have produced over that window
    pub expected_bars: usize,
    /// Upstream attributes, typically fundamentals only; price-derived
    /// fields are overwritten by the feature computer
    pub attrs: RawAttributes,
}

/// Outcome for one instrument within a run.
#[derive(Debug, Clone)]
pub enum ScoreOutcome {
    /// Passed the gate and produced a score
    Scored {
        gating: GatingResult,
        score: ScoreResult,
    },
    /// Rejected by the gate; a valid terminal verdict, not an error
    Ineligible { gating: GatingResult },
    /// Passed the gate but no pillar could be computed
    Unscoreable { gating: GatingResult, error: String },
}

/// Totals for one completed batch.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// Pure scoring state shared across worker tasks.
struct ScoreCore {
    params: PillarParams,
    weights: PillarWeights,
    gate: GatingEvaluator,
    guard: InstitutionalGuard,
}

impl ScoreCore {
    /// Run the gate-feature-score-guard pipeline for one instrument.
    fn score_one(&self, input: &InstrumentInput) -> ScoreOutcome {
        let features = PriceFeatures::compute(&input.bars, input.expected_bars);

        let mut attrs = input.attrs.clone();
        features.apply_to(&mut attrs);

        let gate_signals = GateSignals {
            coverage: attrs.coverage,
            stale_ratio: attrs.stale_ratio,
            liquidity_usd: attrs.adv_usd,
            history_bars: features.history_bars,
            last_price: attrs.last_price,
            last_bar_date: features.last_bar_date,
        };
        let gating = self
            .gate
            .evaluate(&input.instrument.market_scope, &gate_signals);
        if !gating.eligible {
            return ScoreOutcome::Ineligible { gating };
        }

        let breakdowns = pillars::score_all(&attrs, &self.params);
        let conf = confidence::estimate(&attrs);

        let raw_score = match composer::compose(&input.instrument.asset_id, &breakdowns, &self.weights)
        {
            Ok(raw) => raw,
            Err(e) => {
                return ScoreOutcome::Unscoreable {
                    gating,
                    error: e.to_string(),
                }
            }
        };

        let verdict = self.guard.apply(
            raw_score,
            conf,
            &GuardSignals {
                adv_usd: attrs.adv_usd,
                market_cap: attrs.market_cap,
                last_price: attrs.last_price,
                coverage: attrs.coverage,
            },
        );

        let score = ScoreResult {
            asset_id: input.instrument.asset_id.clone(),
            market_scope: input.instrument.market_scope.clone(),
            raw_score,
            final_score: verdict.final_score,
            confidence: conf * 100.0,
            liquidity_tier: verdict.liquidity_tier,
            caps_applied: verdict.caps_applied,
            min_recommended_horizon_years: verdict.min_recommended_horizon_years,
            pillars: breakdowns,
            scored_at: chrono::Utc::now(),
        };

        ScoreOutcome::Scored { gating, score }
    }
}

/// Batch scoring engine over a staging store.
pub struct ScoringEngine<S: StagingStore> {
    core: Arc<ScoreCore>,
    coordinator: Arc<RunCoordinator<S>>,
    workers: usize,
}

impl<S: StagingStore + 'static> ScoringEngine<S> {
    pub fn new(config: ScoringConfig, coordinator: Arc<RunCoordinator<S>>) -> Self {
        let core = ScoreCore {
            params: config.pillars,
            weights: config.pillar_weights,
            gate: GatingEvaluator::new(config.gating),
            guard: InstitutionalGuard::new(config.guard),
        };
        Self {
            core: Arc::new(core),
            coordinator,
            workers: config.workers.max(1),
        }
    }

    pub fn coordinator(&self) -> &Arc<RunCoordinator<S>> {
        &self.coordinator
    }

    /// Score one instrument without staging anything. Useful for ad-hoc
    /// evaluation outside a run.
    pub fn score_one(&self, input: &InstrumentInput) -> ScoreOutcome {
        self.core.score_one(input)
    }

    /// Run a full scoring batch for a market scope and publish the result.
    ///
    /// Instruments are split across worker tasks. Gate rejections and
    /// unscoreable instruments are staged/counted and do not abort the
    /// batch; a storage error does, marking the run failed with nothing
    /// published.
    pub async fn run_batch(
        &self,
        market_scope: &str,
        inputs: Vec<InstrumentInput>,
    ) -> Result<RunSummary> {
        self.run(market_scope, inputs, JobType::Score).await
    }

    /// Gating-only refresh: stage and publish eligibility verdicts without
    /// recomputing scores.
    pub async fn run_gating(
        &self,
        market_scope: &str,
        inputs: Vec<InstrumentInput>,
    ) -> Result<RunSummary> {
        self.run(market_scope, inputs, JobType::Gating).await
    }

    async fn run(
        &self,
        market_scope: &str,
        inputs: Vec<InstrumentInput>,
        job_type: JobType,
    ) -> Result<RunSummary> {
        let run_id = self.coordinator.begin_run(market_scope, job_type).await?;
        let total = inputs.len();

        match self.process_all(&run_id, inputs, job_type).await {
            Ok((processed, succeeded, failed)) => {
                self.coordinator.publish(&run_id).await?;
                info!(
                    run_id = %run_id,
                    market_scope,
                    total,
                    succeeded,
                    failed,
                    "Batch complete"
                );
                Ok(RunSummary {
                    run_id,
                    processed,
                    succeeded,
                    failed,
                })
            }
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Batch aborted");
                if let Err(mark_err) = self.coordinator.fail(&run_id, &e.to_string()).await {
                    warn!(run_id = %run_id, error = %mark_err, "Could not mark run failed");
                }
                Err(e)
            }
        }
    }

    async fn process_all(
        &self,
        run_id: &str,
        inputs: Vec<InstrumentInput>,
        job_type: JobType,
    ) -> Result<(u64, u64, u64)> {
        if inputs.is_empty() {
            return Ok((0, 0, 0));
        }

        let chunk_size = inputs.len().div_ceil(self.workers);
        let chunks: Vec<Vec<InstrumentInput>> = inputs
            .chunks(chunk_size)
            .map(|c| c.to_vec())
            .collect();

        let mut handles = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let core = self.core.clone();
            let coordinator = self.coordinator.clone();
            let run_id = run_id.to_string();

            handles.push(tokio::spawn(async move {
                let mut processed = 0u64;
                let mut succeeded = 0u64;
                let mut failed = 0u64;

                for input in &chunk {
                    let asset_id = input.instrument.asset_id.clone();
                    let scope = input.instrument.market_scope.clone();
                    processed += 1;

                    match (job_type, core.score_one(input)) {
                        (JobType::Gating, outcome) => {
                            let gating = match outcome {
                                ScoreOutcome::Scored { gating, .. }
                                | ScoreOutcome::Ineligible { gating }
                                | ScoreOutcome::Unscoreable { gating, .. } => gating,
                            };
                            coordinator
                                .stage_gating(&run_id, &asset_id, &scope, &gating)
                                .await?;
                            succeeded += 1;
                        }
                        (JobType::Score, ScoreOutcome::Scored { gating, score }) => {
                            coordinator
                                .stage_gating(&run_id, &asset_id, &scope, &gating)
                                .await?;
                            coordinator.stage_score(&run_id, &score).await?;
                            succeeded += 1;
                        }
                        (JobType::Score, ScoreOutcome::Ineligible { gating }) => {
                            debug!(
                                asset_id = %asset_id,
                                reason = gating.reason.as_deref().unwrap_or(""),
                                "Gated out"
                            );
                            coordinator
                                .stage_gating(&run_id, &asset_id, &scope, &gating)
                                .await?;
                            succeeded += 1;
                        }
                        (JobType::Score, ScoreOutcome::Unscoreable { gating, error }) => {
                            warn!(asset_id = %asset_id, error = %error, "Unscoreable");
                            coordinator
                                .stage_gating(&run_id, &asset_id, &scope, &gating)
                                .await?;
                            failed += 1;
                        }
                    }
                }

                coordinator
                    .record_progress(&run_id, processed, succeeded, failed)
                    .await?;
                Ok::<(u64, u64, u64), ScoreError>((processed, succeeded, failed))
            }));
        }

        let mut totals = (0u64, 0u64, 0u64);
        for handle in handles {
            let (p, s, f) = handle.await.map_err(|e| ScoreError::Worker {
                run_id: run_id.to_string(),
                message: format!("task panicked: {e}"),
            })??;
            totals.0 += p;
            totals.1 += s;
            totals.2 += f;
        }
        Ok(totals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StagingStore};
    use crate::types::RunStatus;
    use chrono::NaiveDate;

    fn make_bars(n: usize, start_price: f64, drift: f64) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..n)
            .map(|i| {
                let price = start_price + drift * i as f64 + (i % 7) as f64 * 0.1;
                Bar {
                    date: start + chrono::Duration::days(i as i64),
                    open: price,
                    high: price * 1.01,
                    low: price * 0.99,
                    close: price,
                    volume: 1_000_000.0,
                }
            })
            .collect()
    }

    fn fundamentals() -> RawAttributes {
        RawAttributes {
            market_cap: Some(5_000_000_000.0),
            pe_ttm: Some(18.0),
            pb: Some(2.5),
            roe: Some(22.0),
            gross_margin: Some(40.0),
            net_margin: Some(15.0),
            debt_to_equity: Some(60.0),
            revenue_growth: Some(10.0),
            earnings_growth: Some(12.0),
            fcf_yield: Some(5.0),
            dividend_yield: Some(2.0),
            ..Default::default()
        }
    }

    fn scoreable_input(asset_id: &str) -> InstrumentInput {
        InstrumentInput {
            instrument: Instrument::new(asset_id, "US"),
            bars: make_bars(260, 40.0, 0.05),
            expected_bars: 260,
            attrs: fundamentals(),
        }
    }

    fn engine() -> ScoringEngine<MemoryStore> {
        let coordinator = Arc::new(RunCoordinator::new(Arc::new(MemoryStore::new())));
        ScoringEngine::new(ScoringConfig::default(), coordinator)
    }

    #[test]
    fn test_score_one_full_pipeline() {
        let outcome = engine().score_one(&scoreable_input("AAPL.US"));
        match outcome {
            ScoreOutcome::Scored { gating, score } => {
                assert!(gating.eligible);
                assert!((0.0..=100.0).contains(&score.raw_score));
                assert!(score.final_score <= score.raw_score + f64::EPSILON);
                assert!((0.0..=100.0).contains(&score.confidence));
                assert_eq!(score.pillars.len(), 5);
            }
            other => panic!("expected Scored, got {other:?}"),
        }
    }

    #[test]
    fn test_score_one_thin_history_gated_out() {
        let input = InstrumentInput {
            instrument: Instrument::new("THIN.US", "US"),
            bars: make_bars(30, 10.0, 0.0),
            expected_bars: 260,
            attrs: fundamentals(),
        };
        let outcome = engine().score_one(&input);
        match outcome {
            ScoreOutcome::Ineligible { gating } => {
                assert!(!gating.eligible);
                assert!(gating.reason.is_some());
            }
            other => panic!("expected Ineligible, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_batch_publishes_scores_and_gating() {
        let store = Arc::new(MemoryStore::new());
        let coordinator = Arc::new(RunCoordinator::new(store.clone()));
        let engine = ScoringEngine::new(ScoringConfig::default(), coordinator);

        let inputs = vec![
            scoreable_input("AAPL.US"),
            scoreable_input("MSFT.US"),
            // Thin history: gated out but still published as a verdict
            InstrumentInput {
                instrument: Instrument::new("THIN.US", "US"),
                bars: make_bars(30, 10.0, 0.0),
                expected_bars: 260,
                attrs: fundamentals(),
            },
        ];

        let summary = engine.run_batch("US", inputs).await.unwrap();
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.failed, 0);

        let run = store.get_run(&summary.run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Success);
        assert_eq!(run.processed, 3);

        assert!(store.get_score("AAPL.US").await.unwrap().is_some());
        assert!(store.get_score("MSFT.US").await.unwrap().is_some());
        assert!(store.get_score("THIN.US").await.unwrap().is_none());

        let thin = store.get_gating("THIN.US").await.unwrap().unwrap();
        assert!(!thin.result.eligible);
    }

    #[tokio::test]
    async fn test_run_batch_empty_input() {
        let summary = engine().run_batch("US", vec![]).await.unwrap();
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.succeeded, 0);
    }

    #[tokio::test]
    async fn test_run_gating_stages_no_scores() {
        let store = Arc::new(MemoryStore::new());
        let coordinator = Arc::new(RunCoordinator::new(store.clone()));
        let engine = ScoringEngine::new(ScoringConfig::default(), coordinator);

        let summary = engine
            .run_gating("US", vec![scoreable_input("AAPL.US")])
            .await
            .unwrap();
        assert_eq!(summary.succeeded, 1);

        assert!(store.get_score("AAPL.US").await.unwrap().is_none());
        let gate = store.get_gating("AAPL.US").await.unwrap().unwrap();
        assert!(gate.result.eligible);
    }

    #[tokio::test]
    async fn test_publish_failure_marks_run_failed() {
        let store = Arc::new(MemoryStore::new());
        let coordinator = Arc::new(RunCoordinator::new(store.clone()));
        let engine = ScoringEngine::new(ScoringConfig::default(), coordinator);

        store.set_fail_publish(true).await;
        let err = engine.run_batch("US", vec![scoreable_input("AAPL.US")]).await;
        assert!(err.is_err());

        let runs = store.list_recent_runs(Some("US"), None, 1).await.unwrap();
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert!(store.get_score("AAPL.US").await.unwrap().is_none());
    }
}
