//! Scoring pipeline configuration.
//!
//! All calibration constants (normalization bands, pillar weights, guard
//! thresholds, gate floors) live here as explicit, versioned configuration
//! passed into each component at construction. Per-market-scope overrides
//! are data, not code branches: different exchanges have structurally
//! different liquidity norms.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Normalization Band
// ============================================================================

/// An inclusive [lo, hi] input band mapped linearly onto [0, 100].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Band {
    pub lo: f64,
    pub hi: f64,
}

impl Band {
    pub const fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }
}

// ============================================================================
// Main Configuration
// ============================================================================

/// Top-level configuration for the scoring pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Configuration version tag, recorded for auditability
    #[serde(default = "default_version")]
    pub version: String,

    /// Number of parallel scoring workers per run
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Composite weights per pillar
    #[serde(default)]
    pub pillar_weights: PillarWeights,

    /// Per-pillar normalization parameters
    #[serde(default)]
    pub pillars: PillarParams,

    /// Institutional guard thresholds
    #[serde(default)]
    pub guard: GuardConfig,

    /// Gating thresholds with per-scope overrides
    #[serde(default)]
    pub gating: GatingConfig,
}

impl ScoringConfig {
    /// Load configuration from a JSON file. Missing fields fall back to
    /// their defaults, so a partial file only overrides what it names.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Sanity checks on values no deployment should run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        let w = &self.pillar_weights;
        let total = w.investability + w.quality + w.safety + w.value + w.momentum;
        if total <= 0.0 {
            anyhow::bail!("pillar weights must sum to a positive value, got {total}");
        }
        if self.workers == 0 {
            anyhow::bail!("workers must be at least 1");
        }
        Ok(())
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            workers: default_workers(),
            pillar_weights: PillarWeights::default(),
            pillars: PillarParams::default(),
            guard: GuardConfig::default(),
            gating: GatingConfig::default(),
        }
    }
}

fn default_version() -> String {
    "v1".to_string()
}

fn default_workers() -> usize {
    8
}

// ============================================================================
// Pillar Weights
// ============================================================================

/// Composite weights applied to pillar scores. Renormalized at composition
/// time over the pillars that actually computed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PillarWeights {
    #[serde(default = "default_w_investability")]
    pub investability: f64,
    #[serde(default = "default_w_quality")]
    pub quality: f64,
    #[serde(default = "default_w_safety")]
    pub safety: f64,
    #[serde(default = "default_w_value")]
    pub value: f64,
    #[serde(default = "default_w_momentum")]
    pub momentum: f64,
}

impl Default for PillarWeights {
    fn default() -> Self {
        Self {
            investability: default_w_investability(),
            quality: default_w_quality(),
            safety: default_w_safety(),
            value: default_w_value(),
            momentum: default_w_momentum(),
        }
    }
}

fn default_w_investability() -> f64 {
    0.25
}
fn default_w_quality() -> f64 {
    0.25
}
fn default_w_safety() -> f64 {
    0.20
}
fn default_w_value() -> f64 {
    0.15
}
fn default_w_momentum() -> f64 {
    0.15
}

// ============================================================================
// Pillar Parameters
// ============================================================================

/// Normalization bands for each pillar's components.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PillarParams {
    #[serde(default)]
    pub investability: InvestabilityParams,
    #[serde(default)]
    pub quality: QualityParams,
    #[serde(default)]
    pub safety: SafetyParams,
    #[serde(default)]
    pub value: ValueParams,
    #[serde(default)]
    pub momentum: MomentumParams,
}

impl Default for PillarParams {
    fn default() -> Self {
        Self {
            investability: InvestabilityParams::default(),
            quality: QualityParams::default(),
            safety: SafetyParams::default(),
            value: ValueParams::default(),
            momentum: MomentumParams::default(),
        }
    }
}

/// Investability: liquidity, size, trading quality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestabilityParams {
    /// log10(adv_usd) band; $10K to $100M by default
    pub adv_usd_log: Band,
    /// log10(market_cap) band; $10M to $100B by default
    pub market_cap_log: Band,
    pub coverage: Band,
    /// Stale ratio band; inverted at scoring time
    pub stale_ratio: Band,
}

impl Default for InvestabilityParams {
    fn default() -> Self {
        Self {
            adv_usd_log: Band::new(4.0, 8.0),
            market_cap_log: Band::new(7.0, 11.0),
            coverage: Band::new(0.5, 1.0),
            stale_ratio: Band::new(0.0, 0.5),
        }
    }
}

/// Quality: profitability, leverage, growth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityParams {
    pub roe: Band,
    pub gross_margin: Band,
    /// Debt-to-equity band (%); inverted at scoring time
    pub debt_to_equity: Band,
    pub earnings_growth: Band,
}

impl Default for QualityParams {
    fn default() -> Self {
        Self {
            roe: Band::new(0.0, 30.0),
            gross_margin: Band::new(0.0, 50.0),
            debt_to_equity: Band::new(0.0, 200.0),
            earnings_growth: Band::new(-20.0, 40.0),
        }
    }
}

/// Safety: all components inverted (lower risk scores higher).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyParams {
    /// Annualized volatility band (%)
    pub volatility: Band,
    /// Max drawdown band (%)
    pub max_drawdown: Band,
    /// Downside deviation band (%)
    pub downside_deviation: Band,
}

impl Default for SafetyParams {
    fn default() -> Self {
        Self {
            volatility: Band::new(10.0, 80.0),
            max_drawdown: Band::new(5.0, 70.0),
            downside_deviation: Band::new(5.0, 60.0),
        }
    }
}

/// Value: inverted multiples with suspicion penalties at the low end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueParams {
    /// PE band; inverted. Below `pe_suspicious_floor` the multiple is
    /// treated as suspicious rather than cheap.
    pub pe: Band,
    pub pe_suspicious_floor: f64,
    /// Fixed score for suspiciously low positive PE
    pub pe_suspicious_score: f64,
    /// Fixed score for non-positive PE (loss-making)
    pub pe_negative_score: f64,
    /// PB band; inverted, with the same suspicion floor treatment
    pub pb: Band,
    pub pb_suspicious_floor: f64,
    pub pb_suspicious_score: f64,
    pub fcf_yield: Band,
    pub dividend_yield: Band,
}

impl Default for ValueParams {
    fn default() -> Self {
        Self {
            pe: Band::new(2.0, 60.0),
            pe_suspicious_floor: 2.0,
            pe_suspicious_score: 30.0,
            pe_negative_score: 20.0,
            pb: Band::new(0.3, 10.0),
            pb_suspicious_floor: 0.3,
            pb_suspicious_score: 40.0,
            fcf_yield: Band::new(0.0, 10.0),
            dividend_yield: Band::new(0.0, 5.0),
        }
    }
}

/// Momentum: RSI band position, trend, short/long momentum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentumParams {
    /// Price vs SMA200 band, as percent deviation
    pub price_vs_sma200: Band,
    pub momentum_63d: Band,
    pub momentum_252d: Band,
}

impl Default for MomentumParams {
    fn default() -> Self {
        Self {
            price_vs_sma200: Band::new(-20.0, 20.0),
            momentum_63d: Band::new(-30.0, 30.0),
            momentum_252d: Band::new(-50.0, 50.0),
        }
    }
}

// ============================================================================
// Guard Configuration
// ============================================================================

/// Institutional guard thresholds: liquidity tiers, penny-price and
/// coverage caps, confidence discounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Tier A floor: adv_usd at or above this is uncapped
    #[serde(default = "default_tier_a_adv")]
    pub tier_a_adv_usd: f64,
    /// Tier B floor
    #[serde(default = "default_tier_b_adv")]
    pub tier_b_adv_usd: f64,
    /// Tier C floor; below this (or below the microcap floor) is tier D
    #[serde(default = "default_tier_c_adv")]
    pub tier_c_adv_usd: f64,
    /// Market caps below this force tier D regardless of liquidity
    #[serde(default = "default_microcap_floor")]
    pub microcap_floor_usd: f64,

    #[serde(default = "default_tier_b_penalty")]
    pub tier_b_penalty: f64,
    #[serde(default = "default_tier_b_ceiling")]
    pub tier_b_ceiling: f64,
    #[serde(default = "default_tier_c_penalty")]
    pub tier_c_penalty: f64,
    #[serde(default = "default_tier_c_ceiling")]
    pub tier_c_ceiling: f64,
    #[serde(default = "default_tier_d_penalty")]
    pub tier_d_penalty: f64,
    #[serde(default = "default_tier_d_ceiling")]
    pub tier_d_ceiling: f64,

    /// Prices below this floor cap the ceiling regardless of tier
    #[serde(default = "default_penny_price_floor")]
    pub penny_price_floor: f64,
    #[serde(default = "default_penny_ceiling")]
    pub penny_ceiling: f64,

    /// Coverage below this floor caps the ceiling
    #[serde(default = "default_coverage_floor")]
    pub coverage_floor: f64,
    #[serde(default = "default_coverage_ceiling")]
    pub coverage_ceiling: f64,

    /// Confidence (0-1) below this floor discounts the score and caps it
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f64,
    #[serde(default = "default_confidence_discount")]
    pub confidence_discount: f64,
    #[serde(default = "default_confidence_ceiling")]
    pub confidence_ceiling: f64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            tier_a_adv_usd: default_tier_a_adv(),
            tier_b_adv_usd: default_tier_b_adv(),
            tier_c_adv_usd: default_tier_c_adv(),
            microcap_floor_usd: default_microcap_floor(),
            tier_b_penalty: default_tier_b_penalty(),
            tier_b_ceiling: default_tier_b_ceiling(),
            tier_c_penalty: default_tier_c_penalty(),
            tier_c_ceiling: default_tier_c_ceiling(),
            tier_d_penalty: default_tier_d_penalty(),
            tier_d_ceiling: default_tier_d_ceiling(),
            penny_price_floor: default_penny_price_floor(),
            penny_ceiling: default_penny_ceiling(),
            coverage_floor: default_coverage_floor(),
            coverage_ceiling: default_coverage_ceiling(),
            confidence_floor: default_confidence_floor(),
            confidence_discount: default_confidence_discount(),
            confidence_ceiling: default_confidence_ceiling(),
        }
    }
}

fn default_tier_a_adv() -> f64 {
    5_000_000.0
}
fn default_tier_b_adv() -> f64 {
    1_000_000.0
}
fn default_tier_c_adv() -> f64 {
    250_000.0
}
fn default_microcap_floor() -> f64 {
    50_000_000.0
}
fn default_tier_b_penalty() -> f64 {
    5.0
}
fn default_tier_b_ceiling() -> f64 {
    90.0
}
fn default_tier_c_penalty() -> f64 {
    15.0
}
fn default_tier_c_ceiling() -> f64 {
    75.0
}
fn default_tier_d_penalty() -> f64 {
    25.0
}
fn default_tier_d_ceiling() -> f64 {
    55.0
}
fn default_penny_price_floor() -> f64 {
    1.0
}
fn default_penny_ceiling() -> f64 {
    60.0
}
fn default_coverage_floor() -> f64 {
    0.8
}
fn default_coverage_ceiling() -> f64 {
    70.0
}
fn default_confidence_floor() -> f64 {
    0.5
}
fn default_confidence_discount() -> f64 {
    0.85
}
fn default_confidence_ceiling() -> f64 {
    65.0
}

// ============================================================================
// Gating Configuration
// ============================================================================

/// Eligibility thresholds for one market scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateThresholds {
    #[serde(default = "default_min_coverage")]
    pub min_coverage: f64,
    #[serde(default = "default_max_stale_ratio")]
    pub max_stale_ratio: f64,
    #[serde(default = "default_min_liquidity_usd")]
    pub min_liquidity_usd: f64,
    #[serde(default = "default_min_history_bars")]
    pub min_history_bars: usize,
    #[serde(default = "default_min_price")]
    pub min_price: f64,
    /// Whether this scope carries FX exposure for the base currency
    #[serde(default)]
    pub fx_exposed: bool,
    /// Currency stability factor in [0, 1] for FX-exposed scopes
    #[serde(default = "default_currency_stability")]
    pub currency_stability: f64,
    /// Market tier: 1 = major, 2 = secondary, 3 = frontier
    #[serde(default = "default_market_tier")]
    pub market_tier: u8,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            min_coverage: default_min_coverage(),
            max_stale_ratio: default_max_stale_ratio(),
            min_liquidity_usd: default_min_liquidity_usd(),
            min_history_bars: default_min_history_bars(),
            min_price: default_min_price(),
            fx_exposed: false,
            currency_stability: default_currency_stability(),
            market_tier: default_market_tier(),
        }
    }
}

fn default_min_coverage() -> f64 {
    0.7
}
fn default_max_stale_ratio() -> f64 {
    0.4
}
fn default_min_liquidity_usd() -> f64 {
    100_000.0
}
fn default_min_history_bars() -> usize {
    126
}
fn default_min_price() -> f64 {
    0.5
}
fn default_currency_stability() -> f64 {
    1.0
}
fn default_market_tier() -> u8 {
    1
}

/// Gating configuration: default thresholds plus per-scope overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatingConfig {
    #[serde(default)]
    pub default: GateThresholds,
    /// Overrides keyed by market scope (e.g. "US", "LSE")
    #[serde(default)]
    pub overrides: HashMap<String, GateThresholds>,
}

impl GatingConfig {
    /// Thresholds in effect for a market scope.
    pub fn for_scope(&self, market_scope: &str) -> &GateThresholds {
        self.overrides.get(market_scope).unwrap_or(&self.default)
    }
}

// ============================================================================
// Tests
// ============================================================================
