//! Pillar scorers.
//!
//! Five independent scoring dimensions, each a pure function of the flat
//! attribute record. A pillar internally weights its sub-components; a
//! missing component is excluded and the remaining weights renormalize to
//! sum to 1. A pillar score is `None` only when none of its components
//! could be computed.

mod investability;
mod momentum;
mod quality;
mod safety;
mod value;

pub use investability::score as investability;
pub use momentum::score as momentum;
pub use quality::score as quality;
pub use safety::score as safety;
pub use value::score as value;

use crate::config::PillarParams;
use crate::normalize;
use crate::types::{ComponentScore, Pillar, PillarBreakdown, RawAttributes};

/// Score all five pillars in canonical order.
pub fn score_all(attrs: &RawAttributes, params: &PillarParams) -> Vec<PillarBreakdown> {
    vec![
        investability(attrs, &params.investability),
        quality(attrs, &params.quality),
        safety(attrs, &params.safety),
        value(attrs, &params.value),
        momentum(attrs, &params.momentum),
    ]
}

/// Assemble a breakdown from evaluated components, computing the pillar
/// score as the renormalized weighted mean over present components.
pub(crate) fn breakdown(pillar: Pillar, components: Vec<ComponentScore>) -> PillarBreakdown {
    let parts: Vec<(Option<f64>, f64)> = components.iter().map(|c| (c.score, c.weight)).collect();
    let score = normalize::weighted_mean(&parts);
    PillarBreakdown {
        pillar,
        score,
        components,
    }
}

pub(crate) fn component(
    name: &str,
    input: Option<f64>,
    weight: f64,
    score: Option<f64>,
) -> ComponentScore {
    ComponentScore {
        name: name.to_string(),
        input,
        weight,
        score,
    }
}
