//! Composite score composition.
//!
//! Combines the pillar scores that could be computed into one raw 0-100
//! composite, renormalizing the configured weights over the available
//! pillars. Zero available pillars is the one hard failure in the scoring
//! path: the caller must record the instrument as unscoreable rather than
//! emit a default score.

use crate::config::PillarWeights;
use crate::error::ScoreError;
use crate::normalize;
use crate::types::{Pillar, PillarBreakdown};

/// Compose the raw (pre-guard) score from pillar breakdowns.
pub fn compose(
    asset_id: &str,
    breakdowns: &[PillarBreakdown],
    weights: &PillarWeights,
) -> Result<f64, ScoreError> {
    let parts: Vec<(Option<f64>, f64)> = breakdowns
        .iter()
        .map(|b| (b.score, weight_for(b.pillar, weights)))
        .collect();

    normalize::weighted_mean(&parts).ok_or_else(|| ScoreError::NoPillarsComputable {
        asset_id: asset_id.to_string(),
    })
}

fn weight_for(pillar: Pillar, weights: &PillarWeights) -> f64 {
    match pillar {
        Pillar::Investability => weights.investability,
        Pillar::Quality => weights.quality,
        Pillar::Safety => weights.safety,
        Pillar::Value => weights.value,
        Pillar::Momentum => weights.momentum,
    }
}
