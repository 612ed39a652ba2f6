//! Pure numeric normalization utilities.
//!
//! Every function here maps an input onto [0, 100] or returns `None` for
//! missing/non-finite input, so downstream composers can distinguish
//! "missing" from "worst possible". NaN and infinity never leak through.

use crate::config::Band;

/// Clamp a score to [0, 100].
fn clamp_score(score: f64) -> f64 {
    score.clamp(0.0, 100.0)
}

/// Linearly scale `value` from `[min, max]` onto [0, 100].
///
/// Values outside the band clamp to the endpoints. `invert` flips the
/// mapping so lower inputs score higher. Returns `None` for non-finite
/// input or a degenerate band.
pub fn linear(value: Option<f64>, min: f64, max: f64, invert: bool) -> Option<f64> {
    let v = value.filter(|v| v.is_finite())?;
    if !min.is_finite() || !max.is_finite() || min >= max {
        return None;
    }

    let frac = ((v - min) / (max - min)).clamp(0.0, 1.0);
    let score = if invert { 1.0 - frac } else { frac } * 100.0;
    Some(clamp_score(score))
}

/// Linear scaling against a configured [`Band`].
pub fn linear_band(value: Option<f64>, band: Band, invert: bool) -> Option<f64> {
    linear(value, band.lo, band.hi, invert)
}

/// Score `value` by its rank within `reference`, winsorized at the 1st and
/// 99th percentiles before ranking.
///
/// Returns the percentile rank of the (winsorized) value among the
/// winsorized reference values, scaled to [0, 100]. `None` when the value
/// is non-finite or the reference has no finite entries.
pub fn quantile(value: Option<f64>, reference: &[f64], invert: bool) -> Option<f64> {
    let v = value.filter(|v| v.is_finite())?;

    let mut sorted: Vec<f64> = reference.iter().copied().filter(|r| r.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let p1 = percentile_sorted(&sorted, 1.0);
    let p99 = percentile_sorted(&sorted, 99.0);
    let v = v.clamp(p1, p99);

    let below = sorted
        .iter()
        .map(|r| r.clamp(p1, p99))
        .filter(|r| *r <= v)
        .count();
    let rank = below as f64 / sorted.len() as f64;

    let score = if invert { 1.0 - rank } else { rank } * 100.0;
    Some(clamp_score(score))
}

/// Percentile (0-100) of an ascending-sorted non-empty slice, with linear
/// interpolation between adjacent entries.
fn percentile_sorted(sorted: &[f64], pct: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    if sorted.len() == 1 {
        return sorted[0];
    }

    let pos = (pct / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Score an RSI reading on its band position.
///
/// Peak score at RSI 55; the 40-70 band keeps most of the credit, tapering
/// toward the edges; readings beyond 30/80 fall off sharply (overbought or
/// oversold extremes are penalized symmetrically).
pub fn rsi_score(rsi: Option<f64>) -> Option<f64> {
    let r = rsi.filter(|r| r.is_finite())?;

    let score = if (40.0..=70.0).contains(&r) {
        100.0 - (r - 55.0).abs()
    } else if (30.0..40.0).contains(&r) {
        85.0 - (40.0 - r) * 3.0
    } else if r > 70.0 && r <= 80.0 {
        85.0 - (r - 70.0) * 3.0
    } else if r < 30.0 {
        55.0 - (30.0 - r) * 5.0
    } else {
        // r > 80
        55.0 - (r - 80.0) * 5.0
    };

    Some(clamp_score(score))
}

/// Weighted average over present values, renormalizing weights so the
/// present ones sum to 1.
///
/// Returns `None` when no value is present or the total present weight is
/// zero. This is the shared "renormalize remaining weights" primitive used
/// by every pillar and by the composer.
pub fn weighted_mean(parts: &[(Option<f64>, f64)]) -> Option<f64> {
    let mut sum = 0.0;
    let mut weight_sum = 0.0;

    for &(value, weight) in parts {
        if let Some(v) = value.filter(|v| v.is_finite()) {
            if weight > 0.0 {
                sum += v * weight;
                weight_sum += weight;
            }
        }
    }

    if weight_sum > 0.0 {
        Some(sum / weight_sum)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_basic() {
        assert_eq!(linear(Some(50.0), 0.0, 100.0, false), Some(50.0));
        assert_eq!(linear(Some(0.0), 0.0, 100.0, false), Some(0.0));
        assert_eq!(linear(Some(100.0), 0.0, 100.0, false), Some(100.0));
    }

    #[test]
    fn test_linear_clamps_out_of_band() {
        assert_eq!(linear(Some(-10.0), 0.0, 100.0, false), Some(0.0));
        assert_eq!(linear(Some(150.0), 0.0, 100.0, false), Some(100.0));
    }

    #[test]
    fn test_linear_invert() {
        assert_eq!(linear(Some(20.0), 0.0, 100.0, true), Some(80.0));
        assert_eq!(linear(Some(0.0), 0.0, 100.0, true), Some(100.0));
    }

    #[test]
    fn test_linear_missing_and_nonfinite() {
        assert_eq!(linear(None, 0.0, 100.0, false), None);
        assert_eq!(linear(Some(f64::NAN), 0.0, 100.0, false), None);
        assert_eq!(linear(Some(f64::INFINITY), 0.0, 100.0, false), None);
        // Degenerate band
        assert_eq!(linear(Some(5.0), 10.0, 10.0, false), None);
        assert_eq!(linear(Some(5.0), 10.0, 1.0, false), None);
    }

    #[test]
    fn test_quantile_rank() {
        let reference: Vec<f64> = (1..=100).map(|i| i as f64).collect();
        let mid = quantile(Some(50.0), &reference, false).unwrap();
        assert!((mid - 50.0).abs() < 2.0);

        let low = quantile(Some(1.0), &reference, false).unwrap();
        let high = quantile(Some(100.0), &reference, false).unwrap();
        assert!(low < 5.0);
        assert!((high - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_quantile_winsorizes_outliers() {
        let mut reference: Vec<f64> = (1..=99).map(|i| i as f64).collect();
        reference.push(1_000_000.0); // Extreme outlier
        // A merely-large value still ranks near the top despite the outlier
        let score = quantile(Some(500.0), &reference, false).unwrap();
        assert!(score >= 99.0);
        // A value beyond the 99th percentile clamps to it and ranks at 100
        let top = quantile(Some(2_000_000.0), &reference, false).unwrap();
        assert!((top - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_quantile_empty_and_missing() {
        assert_eq!(quantile(Some(1.0), &[], false), None);
        assert_eq!(quantile(None, &[1.0, 2.0], false), None);
        assert_eq!(quantile(Some(1.0), &[f64::NAN], false), None);
    }

    #[test]
    fn test_quantile_invert() {
        let reference: Vec<f64> = (1..=100).map(|i| i as f64).collect();
        let s = quantile(Some(90.0), &reference, true).unwrap();
        assert!(s < 15.0);
    }

    #[test]
    fn test_rsi_peak_and_band() {
        assert_eq!(rsi_score(Some(55.0)), Some(100.0));
        assert_eq!(rsi_score(Some(40.0)), Some(85.0));
        assert_eq!(rsi_score(Some(70.0)), Some(85.0));
    }

    #[test]
    fn test_rsi_sharp_penalty_beyond_extremes() {
        let at_30 = rsi_score(Some(30.0)).unwrap();
        let at_20 = rsi_score(Some(20.0)).unwrap();
        assert!(at_30 > at_20);
        assert!(at_30 - at_20 > 30.0); // Steep, not gradual

        let at_80 = rsi_score(Some(80.0)).unwrap();
        let at_90 = rsi_score(Some(90.0)).unwrap();
        assert!(at_80 > at_90);
        assert_eq!(rsi_score(Some(95.0)), Some(0.0));
    }

    #[test]
    fn test_rsi_missing() {
        assert_eq!(rsi_score(None), None);
        assert_eq!(rsi_score(Some(f64::NAN)), None);
    }

    #[test]
    fn test_all_outputs_bounded() {
        for v in [-1e9, -50.0, 0.0, 0.5, 55.0, 99.0, 1e9] {
            for invert in [false, true] {
                if let Some(s) = linear(Some(v), -10.0, 10.0, invert) {
                    assert!((0.0..=100.0).contains(&s));
                }
                if let Some(s) = rsi_score(Some(v)) {
                    assert!((0.0..=100.0).contains(&s));
                }
            }
        }
    }

    #[test]
    fn test_weighted_mean_renormalizes() {
        // Missing middle component; remaining weights renormalize to 1
        let parts = [(Some(100.0), 0.5), (None, 0.3), (Some(0.0), 0.2)];
        let mean = weighted_mean(&parts).unwrap();
        assert!((mean - 100.0 * (0.5 / 0.7)).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_mean_none_when_empty() {
        assert_eq!(weighted_mean(&[]), None);
        assert_eq!(weighted_mean(&[(None, 0.5), (None, 0.5)]), None);
        assert_eq!(weighted_mean(&[(Some(50.0), 0.0)]), None);
        assert_eq!(weighted_mean(&[(Some(f64::NAN), 1.0)]), None);
    }
}
