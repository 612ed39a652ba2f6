//! Momentum pillar: RSI band position, long-term trend, and short/long
//! momentum.

use crate::config::MomentumParams;
use crate::normalize;
use crate::types::{Pillar, PillarBreakdown, RawAttributes};

use super::{breakdown, component};

const W_RSI: f64 = 0.30;
const W_TREND: f64 = 0.30;
const W_MOMENTUM_SHORT: f64 = 0.20;
const W_MOMENTUM_LONG: f64 = 0.20;

pub fn score(attrs: &RawAttributes, params: &MomentumParams) -> PillarBreakdown {
    // Percent deviation of price from its 200-day average
    let trend = match (attrs.last_price, attrs.sma_200) {
        (Some(price), Some(sma)) if sma > 0.0 => Some((price / sma - 1.0) * 100.0),
        _ => None,
    };

    let components = vec![
        component(
            "rsi_14",
            attrs.rsi_14,
            W_RSI,
            normalize::rsi_score(attrs.rsi_14),
        ),
        component(
            "price_vs_sma200",
            trend,
            W_TREND,
            normalize::linear_band(trend, params.price_vs_sma200, false),
        ),
        component(
            "momentum_63d",
            attrs.momentum_63d,
            W_MOMENTUM_SHORT,
            normalize::linear_band(attrs.momentum_63d, params.momentum_63d, false),
        ),
        component(
            "momentum_252d",
            attrs.momentum_252d,
            W_MOMENTUM_LONG,
            normalize::linear_band(attrs.momentum_252d, params.momentum_252d, false),
        ),
    ];

    breakdown(Pillar::Momentum, components)
}
