//! Safety pillar: inverted risk measures.
//!
//! Lower volatility, shallower drawdowns, and smaller downside deviation
//! all score higher.

use crate::config::SafetyParams;
use crate::normalize;
use crate::types::{Pillar, PillarBreakdown, RawAttributes};

use super::{breakdown, component};

const W_VOLATILITY: f64 = 0.40;
const W_DRAWDOWN: f64 = 0.35;
const W_DOWNSIDE: f64 = 0.25;

pub fn score(attrs: &RawAttributes, params: &SafetyParams) -> PillarBreakdown {
    // Drawdown is carried as a fraction; the band is in percent
    let drawdown_pct = attrs.max_drawdown_1y.map(|d| d * 100.0);

    let components = vec![
        component(
            "volatility",
            attrs.volatility_1y,
            W_VOLATILITY,
            normalize::linear_band(attrs.volatility_1y, params.volatility, true),
        ),
        component(
            "max_drawdown",
            drawdown_pct,
            W_DRAWDOWN,
            normalize::linear_band(drawdown_pct, params.max_drawdown, true),
        ),
        component(
            "downside_deviation",
            attrs.downside_deviation,
            W_DOWNSIDE,
            normalize::linear_band(attrs.downside_deviation, params.downside_deviation, true),
        ),
    ];

    breakdown(Pillar::Safety, components)
}
