//! Institutional guard: deterministic caps over the raw composite.
//!
//! Takes the ungated composite plus liquidity/size/price/coverage signals
//! and applies a fixed cascade of penalties and ceilings. Every applied cap
//! appends a human-readable audit entry; the audit trail is part of the
//! output contract, not logging. The raw score is never overwritten.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GuardConfig;
use crate::types::{CapAdjustment, CapCode, LiquidityTier};

/// Liquidity/size/price/coverage signals consumed by the guard.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardSignals {
    /// Average daily dollar volume (USD)
    pub adv_usd: Option<f64>,
    /// Market capitalization (USD)
    pub market_cap: Option<f64>,
    pub last_price: Option<f64>,
    /// Bar coverage in [0, 1]
    pub coverage: Option<f64>,
}

/// Guard output: the bounded final score plus its audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardVerdict {
    /// Final score in [0, 100]; never above the raw score when any cap or
    /// discount fired
    pub final_score: f64,
    pub liquidity_tier: LiquidityTier,
    pub caps_applied: Vec<CapAdjustment>,
    pub min_recommended_horizon_years: u8,
}

/// Applies the institutional cap cascade. Stateless; thresholds come from
/// the config handed in at construction.
#[derive(Debug, Clone)]
pub struct InstitutionalGuard {
    config: GuardConfig,
}

impl InstitutionalGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self { config }
    }

    /// Apply the cap cascade to a raw score.
    ///
    /// `confidence` is the 0-1 input-coverage confidence. Each step only
    /// ever lowers the running score or the active ceiling; the order is
    /// fixed but no step can raise what an earlier one lowered, so the
    /// result is order-independent.
    pub fn apply(&self, raw_score: f64, confidence: f64, signals: &GuardSignals) -> GuardVerdict {
        let cfg = &self.config;
        let mut running = raw_score.clamp(0.0, 100.0);
        let mut ceiling = 100.0_f64;
        let mut caps: Vec<CapAdjustment> = Vec::new();

        // 1. Liquidity tier. Missing ADV is treated as zero liquidity: an
        //    instrument we cannot size a position in must not score high.
        let tier = self.classify_tier(signals);
        let (penalty, tier_ceiling) = match tier {
            LiquidityTier::A => (0.0, 100.0),
            LiquidityTier::B => (cfg.tier_b_penalty, cfg.tier_b_ceiling),
            LiquidityTier::C => (cfg.tier_c_penalty, cfg.tier_c_ceiling),
            LiquidityTier::D => (cfg.tier_d_penalty, cfg.tier_d_ceiling),
        };
        if tier != LiquidityTier::A {
            running -= penalty;
            ceiling = ceiling.min(tier_ceiling);
            caps.push(CapAdjustment {
                code: CapCode::LiquidityTier,
                reason: format!(
                    "liquidity tier {} ({}): -{penalty:.0} points, capped at {tier_ceiling:.0}",
                    tier,
                    describe_liquidity(signals),
                ),
            });
        }

        // 2. Penny price cap, regardless of tier
        if let Some(price) = signals.last_price.filter(|p| p.is_finite()) {
            if price < cfg.penny_price_floor {
                ceiling = ceiling.min(cfg.penny_ceiling);
                caps.push(CapAdjustment {
                    code: CapCode::PennyPrice,
                    reason: format!(
                        "price {price:.2} below {:.2} floor: capped at {:.0}",
                        cfg.penny_price_floor, cfg.penny_ceiling
                    ),
                });
            }
        }

        // 3. Low coverage cap
        if let Some(coverage) = signals.coverage.filter(|c| c.is_finite()) {
            if coverage < cfg.coverage_floor {
                ceiling = ceiling.min(cfg.coverage_ceiling);
                caps.push(CapAdjustment {
                    code: CapCode::LowCoverage,
                    reason: format!(
                        "coverage {coverage:.2} below {:.2} floor: capped at {:.0}",
                        cfg.coverage_floor, cfg.coverage_ceiling
                    ),
                });
            }
        }

        // 4. Low confidence: discount the running score and cap it
        if confidence < cfg.confidence_floor {
            running *= cfg.confidence_discount;
            ceiling = ceiling.min(cfg.confidence_ceiling);
            caps.push(CapAdjustment {
                code: CapCode::LowConfidence,
                reason: format!(
                    "confidence {confidence:.2} below {:.2} floor: x{:.2} discount, capped at {:.0}",
                    cfg.confidence_floor, cfg.confidence_discount, cfg.confidence_ceiling
                ),
            });
        }

        let final_score = running.min(ceiling).clamp(0.0, 100.0);

        // Horizon from tier, shortened once if any data-quality cap fired
        let mut horizon = match tier {
            LiquidityTier::A => 10,
            LiquidityTier::B => 7,
            LiquidityTier::C => 3,
            LiquidityTier::D => 1,
        };
        let data_quality_capped = caps
            .iter()
            .any(|c| !matches!(c.code, CapCode::LiquidityTier));
        if data_quality_capped && horizon > 1 {
            horizon -= 1;
        }

        debug!(
            raw_score,
            final_score,
            tier = %tier,
            caps = caps.len(),
            "Applied institutional guard"
        );

        GuardVerdict {
            final_score,
            liquidity_tier: tier,
            caps_applied: caps,
            min_recommended_horizon_years: horizon,
        }
    }

    fn classify_tier(&self, signals: &GuardSignals) -> LiquidityTier {
        let cfg = &self.config;

        // Microcap floor forces tier D no matter how active the tape looks
        if let Some(mcap) = signals.market_cap.filter(|m| m.is_finite()) {
            if mcap < cfg.microcap_floor_usd {
                return LiquidityTier::D;
            }
        }

        match signals.adv_usd.filter(|a| a.is_finite()) {
            Some(adv) if adv >= cfg.tier_a_adv_usd => LiquidityTier::A,
            Some(adv) if adv >= cfg.tier_b_adv_usd => LiquidityTier::B,
            Some(adv) if adv >= cfg.tier_c_adv_usd => LiquidityTier::C,
            _ => LiquidityTier::D,
        }
    }
}

fn describe_liquidity(signals: &GuardSignals) -> String {
    match signals.adv_usd {
        Some(adv) => format!("ADV ${adv:.0}"),
        None => "ADV unknown".to_string(),
    }
}
