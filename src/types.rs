//! Core data model for the scoring pipeline.
//!
//! Everything the pipeline reads or produces lives here: the instrument
//! identity, the flat attribute record scored against, gating verdicts,
//! pillar breakdowns, guarded score results, and run bookkeeping records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Instrument
// ============================================================================

/// A scoreable instrument, owned by the external universe registry.
///
/// The pipeline only reads this; it never mutates instrument identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    /// Stable instrument identifier (e.g. "AAPL.US")
    pub asset_id: String,
    /// Market partition the instrument is scored under (e.g. "US", "LSE")
    pub market_scope: String,
    /// Instrument type (equity, etf, ...)
    pub asset_type: Option<String>,
    /// Listing exchange
    pub exchange: Option<String>,
    /// Trading currency
    pub currency: Option<String>,
}

impl Instrument {
    pub fn new(asset_id: impl Into<String>, market_scope: impl Into<String>) -> Self {
        Self {
            asset_id: asset_id.into(),
            market_scope: market_scope.into(),
            asset_type: None,
            exchange: None,
            currency: None,
        }
    }
}

// ============================================================================
// Raw Attributes
// ============================================================================

/// Flat, partially-populated attribute record for one instrument at one
/// point in time.
///
/// Field absence is modeled as `None`, never as a sentinel value: every
/// consumer distinguishes "missing" from "worst possible". Price-derived
/// fields are typically filled in by the feature computer; fundamental
/// fields come from the upstream collector as-is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawAttributes {
    // === Price / technical fields ===
    pub last_price: Option<f64>,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub sma_200: Option<f64>,
    pub rsi_14: Option<f64>,
    /// Momentum over 63 trading days (%)
    pub momentum_63d: Option<f64>,
    /// Momentum over 252 trading days (%)
    pub momentum_252d: Option<f64>,
    /// Annualized volatility (%)
    pub volatility_1y: Option<f64>,
    /// Maximum trailing drawdown as a positive fraction (0.35 = -35%)
    pub max_drawdown_1y: Option<f64>,
    /// Annualized downside deviation (%)
    pub downside_deviation: Option<f64>,
    /// Z-score of price vs. its 20-day mean/std
    pub zscore_20d: Option<f64>,
    /// Average daily dollar volume (USD)
    pub adv_usd: Option<f64>,
    /// Observed bars / expected bars, in [0, 1]
    pub coverage: Option<f64>,
    /// Fraction of consecutive-unchanged closes, in [0, 1]
    pub stale_ratio: Option<f64>,

    // === Fundamental fields ===
    pub market_cap: Option<f64>,
    pub pe_ttm: Option<f64>,
    pub pb: Option<f64>,
    /// Return on equity (%)
    pub roe: Option<f64>,
    /// Gross margin (%)
    pub gross_margin: Option<f64>,
    /// Net margin (%)
    pub net_margin: Option<f64>,
    /// Debt to equity ratio (%)
    pub debt_to_equity: Option<f64>,
    /// Year-over-year revenue growth (%)
    pub revenue_growth: Option<f64>,
    /// Year-over-year earnings growth (%)
    pub earnings_growth: Option<f64>,
    /// Free cash flow yield (%)
    pub fcf_yield: Option<f64>,
    /// Dividend yield (%)
    pub dividend_yield: Option<f64>,
}

impl RawAttributes {
    /// Price-derived fields, in declaration order. Used for confidence
    /// coverage counting.
    pub fn price_fields(&self) -> [Option<f64>; 14] {
        [
            self.last_price,
            self.sma_20,
            self.sma_50,
            self.sma_200,
            self.rsi_14,
            self.momentum_63d,
            self.momentum_252d,
            self.volatility_1y,
            self.max_drawdown_1y,
            self.downside_deviation,
            self.zscore_20d,
            self.adv_usd,
            self.coverage,
            self.stale_ratio,
        ]
    }

    /// Fundamental fields, in declaration order.
    pub fn fundamental_fields(&self) -> [Option<f64>; 11] {
        [
            self.market_cap,
            self.pe_ttm,
            self.pb,
            self.roe,
            self.gross_margin,
            self.net_margin,
            self.debt_to_equity,
            self.revenue_growth,
            self.earnings_growth,
            self.fcf_yield,
            self.dividend_yield,
        ]
    }
}

// ============================================================================
// Gating
// ============================================================================

/// Per-instrument eligibility verdict from the gating evaluator.
///
/// A rejection is a valid terminal verdict, not an error: the instrument is
/// recorded ineligible and scoring is skipped for it this run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatingResult {
    /// Whether the instrument has enough data quality to be scored
    pub eligible: bool,
    /// Reason for rejection (first failing check only)
    pub reason: Option<String>,
    /// Coverage that produced the verdict
    pub coverage: Option<f64>,
    /// Stale ratio that produced the verdict
    pub stale_ratio: Option<f64>,
    /// Average daily dollar liquidity that produced the verdict
    pub liquidity_usd: Option<f64>,
    /// Date of the most recent bar seen
    pub last_bar_date: Option<NaiveDate>,
    /// Operational data-quality confidence (0-100). Distinct from the
    /// scoring confidence; used only for monitoring.
    pub data_confidence: f64,
}

// ============================================================================
// Pillars
// ============================================================================

/// One independent scoring dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pillar {
    Investability,
    Quality,
    Safety,
    Value,
    Momentum,
}

impl Pillar {
    pub const ALL: [Pillar; 5] = [
        Pillar::Investability,
        Pillar::Quality,
        Pillar::Safety,
        Pillar::Value,
        Pillar::Momentum,
    ];
}

impl std::fmt::Display for Pillar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Investability => write!(f, "investability"),
            Self::Quality => write!(f, "quality"),
            Self::Safety => write!(f, "safety"),
            Self::Value => write!(f, "value"),
            Self::Momentum => write!(f, "momentum"),
        }
    }
}

/// One weighted sub-component of a pillar score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentScore {
    /// Component name (e.g. "roe", "adv_usd")
    pub name: String,
    /// Raw input value, if present
    pub input: Option<f64>,
    /// Configured weight before renormalization
    pub weight: f64,
    /// Normalized 0-100 score, if the input was present
    pub score: Option<f64>,
}

/// Named sub-scores and the inputs that produced them, for one pillar.
/// Write-once per run; never mutated after scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PillarBreakdown {
    pub pillar: Pillar,
    /// Pillar score in [0, 100]; `None` only when no component computed
    pub score: Option<f64>,
    /// Components in evaluation order
    pub components: Vec<ComponentScore>,
}

// ============================================================================
// Liquidity Tier / Caps
// ============================================================================

/// A-D tradability classification by average daily dollar volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidityTier {
    A,
    B,
    C,
    D,
}

impl LiquidityTier {
    /// Ordering rank: A=3 down to D=0. Lower liquidity never ranks higher.
    pub const fn rank(&self) -> u8 {
        match self {
            Self::A => 3,
            Self::B => 2,
            Self::C => 1,
            Self::D => 0,
        }
    }
}

impl std::fmt::Display for LiquidityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
            Self::C => write!(f, "C"),
            Self::D => write!(f, "D"),
        }
    }
}

impl std::str::FromStr for LiquidityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" => Ok(Self::A),
            "B" => Ok(Self::B),
            "C" => Ok(Self::C),
            "D" => Ok(Self::D),
            other => Err(format!("unknown liquidity tier: {other}")),
        }
    }
}

/// Kind of cap or penalty applied by the institutional guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapCode {
    LiquidityTier,
    PennyPrice,
    LowCoverage,
    LowConfidence,
}

impl std::fmt::Display for CapCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LiquidityTier => write!(f, "liquidity_tier"),
            Self::PennyPrice => write!(f, "penny_price"),
            Self::LowCoverage => write!(f, "low_coverage"),
            Self::LowConfidence => write!(f, "low_confidence"),
        }
    }
}

/// One applied adjustment with its human-readable reason.
///
/// The audit trail of these is mandatory output of the guard, not optional
/// logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapAdjustment {
    pub code: CapCode,
    pub reason: String,
}

// ============================================================================
// Score Result
// ============================================================================

/// Final scoring output for one instrument in one run.
///
/// `raw_score` is the ungated composite and is never overwritten; the guard
/// only ever produces the separate `final_score`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreResult {
    pub asset_id: String,
    pub market_scope: String,
    /// Composite score before institutional caps (0-100)
    pub raw_score: f64,
    /// Score after the guard's cap cascade (0-100)
    pub final_score: f64,
    /// Input-coverage confidence (0-100)
    pub confidence: f64,
    pub liquidity_tier: LiquidityTier,
    /// Applied caps in application order; empty when nothing fired
    pub caps_applied: Vec<CapAdjustment>,
    /// Recommended minimum holding horizon, in whole years
    pub min_recommended_horizon_years: u8,
    /// Per-pillar breakdowns in canonical pillar order
    pub pillars: Vec<PillarBreakdown>,
    pub scored_at: DateTime<Utc>,
}

// ============================================================================
// Run Records
// ============================================================================

/// Kind of work a run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Full gate + score recomputation
    Score,
    /// Gating-only refresh
    Gating,
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Score => write!(f, "score"),
            Self::Gating => write!(f, "gating"),
        }
    }
}

impl std::str::FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "score" => Ok(Self::Score),
            "gating" => Ok(Self::Gating),
            other => Err(format!("unknown job type: {other}")),
        }
    }
}

/// Run lifecycle state. `Running` transitions exactly once into one of the
/// terminal states; no run ever re-enters `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

/// Bookkeeping record for one scoring run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub market_scope: String,
    pub job_type: JobType,
    pub status: RunStatus,
    /// Instruments handled this run (eligible or not)
    pub processed: u64,
    /// Instruments that produced a staged result
    pub succeeded: u64,
    /// Instruments that were unscoreable this run
    pub failed: u64,
    /// Error string for failed/cancelled runs
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_tier_rank_ordering() {
        assert!(LiquidityTier::A.rank() > LiquidityTier::B.rank());
        assert!(LiquidityTier::B.rank() > LiquidityTier::C.rank());
        assert!(LiquidityTier::C.rank() > LiquidityTier::D.rank());
    }

    #[test]
    fn test_tier_roundtrip() {
        for tier in [
            LiquidityTier::A,
            LiquidityTier::B,
            LiquidityTier::C,
            LiquidityTier::D,
        ] {
            let parsed = LiquidityTier::from_str(&tier.to_string()).unwrap();
            assert_eq!(parsed, tier);
        }
        assert!(LiquidityTier::from_str("E").is_err());
    }

    #[test]
    fn test_run_status_terminal() {
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Success.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_run_status_roundtrip() {
        for status in [
            RunStatus::Running,
            RunStatus::Success,
            RunStatus::Failed,
            RunStatus::Cancelled,
        ] {
            assert_eq!(RunStatus::from_str(&status.to_string()).unwrap(), status);
        }
    }

    #[test]
    fn test_field_presence_counting() {
        let attrs = RawAttributes {
            last_price: Some(10.0),
            roe: Some(15.0),
            ..Default::default()
        };
        let price_present = attrs.price_fields().iter().filter(|f| f.is_some()).count();
        let fund_present = attrs
            .fundamental_fields()
            .iter()
            .filter(|f| f.is_some())
            .count();
        assert_eq!(price_present, 1);
        assert_eq!(fund_present, 1);
    }

    #[test]
    fn test_score_result_serialization() {
        let result = ScoreResult {
            asset_id: "AAPL.US".to_string(),
            market_scope: "US".to_string(),
            raw_score: 82.5,
            final_score: 82.5,
            confidence: 91.0,
            liquidity_tier: LiquidityTier::A,
            caps_applied: vec![],
            min_recommended_horizon_years: 10,
            pillars: vec![],
            scored_at: Utc::now(),
        };

        let json = serde_json::to_string(&result).unwrap();
        let parsed: ScoreResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.asset_id, "AAPL.US");
        assert_eq!(parsed.liquidity_tier, LiquidityTier::A);
    }
}
