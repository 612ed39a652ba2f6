//! Input-coverage confidence estimation.

use crate::types::RawAttributes;

/// Weight on fundamental field coverage vs. price field coverage.
const FUNDAMENTAL_WEIGHT: f64 = 0.6;
const PRICE_WEIGHT: f64 = 0.4;

/// Confidence in the score inputs, in [0, 1].
///
/// A deterministic function of field presence only:
/// `0.6 × fundamental coverage + 0.4 × price coverage`. This is the scoring
/// confidence the guard discounts by; it is distinct from the gating
/// evaluator's operational `data_confidence`.
pub fn estimate(attrs: &RawAttributes) -> f64 {
    let fundamentals = attrs.fundamental_fields();
    let prices = attrs.price_fields();

    let fund_coverage = present_fraction(&fundamentals);
    let price_coverage = present_fraction(&prices);

    (FUNDAMENTAL_WEIGHT * fund_coverage + PRICE_WEIGHT * price_coverage).clamp(0.0, 1.0)
}

fn present_fraction(fields: &[Option<f64>]) -> f64 {
    if fields.is_empty() {
        return 0.0;
    }
    let present = fields.iter().filter(|f| f.is_some()).count();
    present as f64 / fields.len() as f64
}
