//! Quality pillar: profitability, leverage, and growth.

use crate::config::QualityParams;
use crate::normalize;
use crate::types::{Pillar, PillarBreakdown, RawAttributes};

use super::{breakdown, component};

const W_ROE: f64 = 0.35;
const W_GROSS_MARGIN: f64 = 0.25;
const W_LEVERAGE: f64 = 0.25;
const W_EARNINGS_GROWTH: f64 = 0.15;

pub fn score(attrs: &RawAttributes, params: &QualityParams) -> PillarBreakdown {
    let components = vec![
        component(
            "roe",
            attrs.roe,
            W_ROE,
            normalize::linear_band(attrs.roe, params.roe, false),
        ),
        component(
            "gross_margin",
            attrs.gross_margin,
            W_GROSS_MARGIN,
            normalize::linear_band(attrs.gross_margin, params.gross_margin, false),
        ),
        component(
            "debt_to_equity",
            attrs.debt_to_equity,
            W_LEVERAGE,
            normalize::linear_band(attrs.debt_to_equity, params.debt_to_equity, true),
        ),
        component(
            "earnings_growth",
            attrs.earnings_growth,
            W_EARNINGS_GROWTH,
            normalize::linear_band(attrs.earnings_growth, params.earnings_growth, false),
        ),
    ];

    breakdown(Pillar::Quality, components)
}
