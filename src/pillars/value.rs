//! Value pillar: inverted valuation multiples with suspicion penalties.
//!
//! Cheap is good, but implausibly cheap is not: a P/E below the suspicion
//! floor usually means a value trap, imminent earnings collapse, or bad
//! data, so it gets a fixed mediocre score instead of full credit.

use crate::config::ValueParams;
use crate::normalize;
use crate::types::{Pillar, PillarBreakdown, RawAttributes};

use super::{breakdown, component};

const W_PE: f64 = 0.35;
const W_PB: f64 = 0.25;
const W_FCF_YIELD: f64 = 0.25;
const W_DIVIDEND_YIELD: f64 = 0.15;

pub fn score(attrs: &RawAttributes, params: &ValueParams) -> PillarBreakdown {
    let components = vec![
        component("pe_ttm", attrs.pe_ttm, W_PE, pe_score(attrs.pe_ttm, params)),
        component("pb", attrs.pb, W_PB, pb_score(attrs.pb, params)),
        component(
            "fcf_yield",
            attrs.fcf_yield,
            W_FCF_YIELD,
            normalize::linear_band(attrs.fcf_yield, params.fcf_yield, false),
        ),
        component(
            "dividend_yield",
            attrs.dividend_yield,
            W_DIVIDEND_YIELD,
            normalize::linear_band(attrs.dividend_yield, params.dividend_yield, false),
        ),
    ];

    breakdown(Pillar::Value, components)
}

fn pe_score(pe: Option<f64>, params: &ValueParams) -> Option<f64> {
    let pe = pe.filter(|v| v.is_finite())?;
    if pe <= 0.0 {
        return Some(params.pe_negative_score);
    }
    if pe < params.pe_suspicious_floor {
        return Some(params.pe_suspicious_score);
    }
    normalize::linear_band(Some(pe), params.pe, true)
}

fn pb_score(pb: Option<f64>, params: &ValueParams) -> Option<f64> {
    let pb = pb.filter(|v| v.is_finite())?;
    if pb <= 0.0 {
        return None;
    }
    if pb < params.pb_suspicious_floor {
        return Some(params.pb_suspicious_score);
    }
    normalize::linear_band(Some(pb), params.pb, true)
}
