//! Investability pillar: can an institution actually build a position?
//!
//! Favors dollar liquidity, market cap, bar coverage, and trading quality
//! (low staleness). Liquidity and size are scored on log10 scales since
//! both span many orders of magnitude across a universe.

use crate::config::InvestabilityParams;
use crate::normalize;
use crate::types::{Pillar, PillarBreakdown, RawAttributes};

use super::{breakdown, component};

const W_ADV: f64 = 0.40;
const W_MARKET_CAP: f64 = 0.25;
const W_COVERAGE: f64 = 0.20;
const W_STALENESS: f64 = 0.15;

pub fn score(attrs: &RawAttributes, params: &InvestabilityParams) -> PillarBreakdown {
    let adv_log = attrs.adv_usd.filter(|v| *v > 0.0).map(f64::log10);
    let mcap_log = attrs.market_cap.filter(|v| *v > 0.0).map(f64::log10);

    let components = vec![
        component(
            "adv_usd",
            attrs.adv_usd,
            W_ADV,
            normalize::linear_band(adv_log, params.adv_usd_log, false),
        ),
        component(
            "market_cap",
            attrs.market_cap,
            W_MARKET_CAP,
            normalize::linear_band(mcap_log, params.market_cap_log, false),
        ),
        component(
            "coverage",
            attrs.coverage,
            W_COVERAGE,
            normalize::linear_band(attrs.coverage, params.coverage, false),
        ),
        component(
            "stale_ratio",
            attrs.stale_ratio,
            W_STALENESS,
            normalize::linear_band(attrs.stale_ratio, params.stale_ratio, true),
        ),
    ];

    breakdown(Pillar::Investability, components)
}
