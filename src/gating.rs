//! Eligibility gating: does an instrument have enough data quality to be
//! scored at all?
//!
//! Thresholds are per-market-scope data, not code: exchanges have
//! structurally different liquidity norms. Checks run in a fixed order and
//! short-circuit on the first failure, so a verdict carries exactly one
//! rejection reason.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{GateThresholds, GatingConfig};
use crate::types::GatingResult;

/// Data-quality signals the gate evaluates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateSignals {
    /// Bar coverage in [0, 1]
    pub coverage: Option<f64>,
    /// Fraction of consecutive-unchanged closes
    pub stale_ratio: Option<f64>,
    /// Average daily dollar volume (USD)
    pub liquidity_usd: Option<f64>,
    /// Bars of history observed
    pub history_bars: usize,
    pub last_price: Option<f64>,
    pub last_bar_date: Option<NaiveDate>,
}

/// Market-scoped eligibility evaluator.
#[derive(Debug, Clone)]
pub struct GatingEvaluator {
    config: GatingConfig,
}

impl GatingEvaluator {
    pub fn new(config: GatingConfig) -> Self {
        Self { config }
    }

    /// Evaluate eligibility for one instrument under its market scope.
    ///
    /// Check order: coverage → staleness → liquidity → minimum history →
    /// minimum price. The first failing check rejects; later checks are not
    /// evaluated. A signal that is missing fails its own check, since the
    /// gate cannot vouch for data it never saw.
    pub fn evaluate(&self, market_scope: &str, signals: &GateSignals) -> GatingResult {
        let thresholds = self.config.for_scope(market_scope);
        let data_confidence = self.data_confidence(thresholds, signals);

        let reason = self.first_failure(thresholds, signals);
        let eligible = reason.is_none();

        if let Some(ref r) = reason {
            debug!(market_scope, reason = %r, "Instrument gated out");
        }

        GatingResult {
            eligible,
            reason,
            coverage: signals.coverage,
            stale_ratio: signals.stale_ratio,
            liquidity_usd: signals.liquidity_usd,
            last_bar_date: signals.last_bar_date,
            data_confidence,
        }
    }

    fn first_failure(&self, t: &GateThresholds, s: &GateSignals) -> Option<String> {
        match s.coverage {
            None => return Some("coverage unavailable".to_string()),
            Some(c) if c < t.min_coverage => {
                return Some(format!(
                    "coverage {c:.2} below minimum {:.2}",
                    t.min_coverage
                ))
            }
            _ => {}
        }

        match s.stale_ratio {
            None => return Some("stale ratio unavailable".to_string()),
            Some(r) if r > t.max_stale_ratio => {
                return Some(format!(
                    "stale ratio {r:.2} above maximum {:.2}",
                    t.max_stale_ratio
                ))
            }
            _ => {}
        }

        match s.liquidity_usd {
            None => return Some("liquidity unavailable".to_string()),
            Some(l) if l < t.min_liquidity_usd => {
                return Some(format!(
                    "liquidity ${l:.0} below minimum ${:.0}",
                    t.min_liquidity_usd
                ))
            }
            _ => {}
        }

        if s.history_bars < t.min_history_bars {
            return Some(format!(
                "history {} bars below minimum {}",
                s.history_bars, t.min_history_bars
            ));
        }

        match s.last_price {
            None => return Some("price unavailable".to_string()),
            Some(p) if p < t.min_price => {
                return Some(format!("price {p:.2} below minimum {:.2}", t.min_price))
            }
            _ => {}
        }

        None
    }

    /// Operational data-quality confidence (0-100): a weighted blend of
    /// coverage, liquidity headroom over the scope floor, staleness,
    /// currency stability, and market tier. Monitoring only; this is not
    /// the scoring confidence.
    fn data_confidence(&self, t: &GateThresholds, s: &GateSignals) -> f64 {
        let coverage_score = s.coverage.unwrap_or(0.0).clamp(0.0, 1.0) * 100.0;

        let liquidity_score = match s.liquidity_usd {
            Some(l) if t.min_liquidity_usd > 0.0 => {
                // Full credit at 10x the floor
                ((l / (t.min_liquidity_usd * 10.0)).clamp(0.0, 1.0)) * 100.0
            }
            Some(_) => 100.0,
            None => 0.0,
        };

        let staleness_score = (1.0 - s.stale_ratio.unwrap_or(1.0).clamp(0.0, 1.0)) * 100.0;

        let currency_score = if t.fx_exposed {
            t.currency_stability.clamp(0.0, 1.0) * 100.0
        } else {
            100.0
        };

        let tier_score = match t.market_tier {
            1 => 100.0,
            2 => 70.0,
            _ => 40.0,
        };

        let blended = 0.35 * coverage_score
            + 0.25 * liquidity_score
            + 0.20 * staleness_score
            + 0.10 * currency_score
            + 0.10 * tier_score;

        blended.clamp(0.0, 100.0)
    }
}
