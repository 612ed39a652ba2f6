//! Technical feature computation from an ordered OHLCV series.
//!
//! Every metric degrades independently: a series shorter than a metric's
//! required window yields `None` for that metric only. Nothing here throws
//! for insufficient history.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::RawAttributes;

/// Trading days per year, used for annualization and window sizing.
const TRADING_DAYS_PER_YEAR: usize = 252;

/// One daily OHLCV bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Price-derived features for one instrument, each independently optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceFeatures {
    pub last_price: Option<f64>,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub sma_200: Option<f64>,
    pub rsi_14: Option<f64>,
    pub momentum_63d: Option<f64>,
    pub momentum_252d: Option<f64>,
    pub volatility_1y: Option<f64>,
    pub max_drawdown_1y: Option<f64>,
    pub downside_deviation: Option<f64>,
    pub zscore_20d: Option<f64>,
    /// Average daily dollar volume over the trailing 20 bars
    pub adv_usd: Option<f64>,
    pub coverage: Option<f64>,
    pub stale_ratio: Option<f64>,
    pub last_bar_date: Option<NaiveDate>,
    /// Number of bars observed
    pub history_bars: usize,
}

impl PriceFeatures {
    /// Compute all features from a time-ascending bar series.
    ///
    /// `expected_bars` is the number of bars the calendar would have
    /// produced over the lookback window; it drives `coverage`.
    pub fn compute(bars: &[Bar], expected_bars: usize) -> Self {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let n = closes.len();

        Self {
            last_price: closes.last().copied().filter(|p| p.is_finite()),
            sma_20: sma(&closes, 20),
            sma_50: sma(&closes, 50),
            sma_200: sma(&closes, 200),
            rsi_14: rsi(&closes, 14),
            momentum_63d: momentum(&closes, 63),
            momentum_252d: momentum(&closes, TRADING_DAYS_PER_YEAR),
            volatility_1y: annualized_volatility(&closes, TRADING_DAYS_PER_YEAR),
            max_drawdown_1y: max_drawdown(&closes, TRADING_DAYS_PER_YEAR),
            downside_deviation: downside_deviation(&closes, TRADING_DAYS_PER_YEAR),
            zscore_20d: zscore(&closes, 20),
            adv_usd: average_dollar_volume(bars, 20),
            coverage: coverage(n, expected_bars),
            stale_ratio: stale_ratio(&closes),
            last_bar_date: bars.last().map(|b| b.date),
            history_bars: n,
        }
    }

    /// Overlay these features onto an attribute record, leaving fundamental
    /// fields untouched.
    pub fn apply_to(&self, attrs: &mut RawAttributes) {
        attrs.last_price = self.last_price;
        attrs.sma_20 = self.sma_20;
        attrs.sma_50 = self.sma_50;
        attrs.sma_200 = self.sma_200;
        attrs.rsi_14 = self.rsi_14;
        attrs.momentum_63d = self.momentum_63d;
        attrs.momentum_252d = self.momentum_252d;
        attrs.volatility_1y = self.volatility_1y;
        attrs.max_drawdown_1y = self.max_drawdown_1y;
        attrs.downside_deviation = self.downside_deviation;
        attrs.zscore_20d = self.zscore_20d;
        if self.adv_usd.is_some() {
            attrs.adv_usd = self.adv_usd;
        }
        attrs.coverage = self.coverage;
        attrs.stale_ratio = self.stale_ratio;
    }
}

/// Simple moving average over the trailing `window` closes.
pub fn sma(closes: &[f64], window: usize) -> Option<f64> {
    if window == 0 || closes.len() < window {
        return None;
    }
    let tail = &closes[closes.len() - window..];
    let sum: f64 = tail.iter().sum();
    let avg = sum / window as f64;
    avg.is_finite().then_some(avg)
}

/// RSI with Wilder smoothing. Needs `period + 1` closes.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;

    // Seed with a plain average over the first `period` changes
    for i in 1..=period {
        let change = closes[i] - closes[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss += -change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;

    // Wilder smoothing over the remainder
    for i in (period + 1)..closes.len() {
        let change = closes[i] - closes[i - 1];
        let (gain, loss) = if change > 0.0 {
            (change, 0.0)
        } else {
            (0.0, -change)
        };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
    }

    let value = if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    };
    value.is_finite().then_some(value)
}

/// Percent change over the trailing `window` bars.
pub fn momentum(closes: &[f64], window: usize) -> Option<f64> {
    if window == 0 || closes.len() < window + 1 {
        return None;
    }
    let start = closes[closes.len() - 1 - window];
    let end = closes[closes.len() - 1];
    if start <= 0.0 {
        return None;
    }
    let pct = (end / start - 1.0) * 100.0;
    pct.is_finite().then_some(pct)
}

/// Annualized volatility (%) from daily log returns over the trailing
/// window. Needs at least 20 returns.
pub fn annualized_volatility(closes: &[f64], window: usize) -> Option<f64> {
    let returns = log_returns(closes, window);
    if returns.len() < 20 {
        return None;
    }
    let sd = std_dev(&returns)?;
    let vol = sd * (TRADING_DAYS_PER_YEAR as f64).sqrt() * 100.0;
    vol.is_finite().then_some(vol)
}

/// Maximum peak-to-trough drawdown over the trailing window, as a positive
/// fraction (0.35 means a 35% drawdown).
pub fn max_drawdown(closes: &[f64], window: usize) -> Option<f64> {
    if closes.len() < 2 {
        return None;
    }
    let start = closes.len().saturating_sub(window);
    let tail = &closes[start..];

    let mut peak = f64::MIN;
    let mut worst: f64 = 0.0;
    for &close in tail {
        if !close.is_finite() || close <= 0.0 {
            return None;
        }
        if close > peak {
            peak = close;
        }
        let dd = 1.0 - close / peak;
        if dd > worst {
            worst = dd;
        }
    }
    Some(worst)
}

/// Annualized downside deviation (%) over the trailing window: the standard
/// deviation of negative daily log returns only. Zero when the window has
/// no down days.
pub fn downside_deviation(closes: &[f64], window: usize) -> Option<f64> {
    let returns = log_returns(closes, window);
    if returns.len() < 20 {
        return None;
    }
    let negatives: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    if negatives.is_empty() {
        return Some(0.0);
    }
    let mean = negatives.iter().sum::<f64>() / negatives.len() as f64;
    let var = negatives.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / negatives.len() as f64;
    let dd = var.sqrt() * (TRADING_DAYS_PER_YEAR as f64).sqrt() * 100.0;
    dd.is_finite().then_some(dd)
}

/// Z-score of the last close against the trailing `window` mean/std.
pub fn zscore(closes: &[f64], window: usize) -> Option<f64> {
    if window < 2 || closes.len() < window {
        return None;
    }
    let tail = &closes[closes.len() - window..];
    let mean = tail.iter().sum::<f64>() / window as f64;
    let var = tail.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / window as f64;
    let sd = var.sqrt();
    if sd == 0.0 || !sd.is_finite() {
        return None;
    }
    let z = (closes[closes.len() - 1] - mean) / sd;
    z.is_finite().then_some(z)
}

/// Average daily dollar volume (close × volume) over the trailing window.
pub fn average_dollar_volume(bars: &[Bar], window: usize) -> Option<f64> {
    if window == 0 || bars.len() < window {
        return None;
    }
    let tail = &bars[bars.len() - window..];
    let sum: f64 = tail.iter().map(|b| b.close * b.volume).sum();
    let avg = sum / window as f64;
    (avg.is_finite() && avg >= 0.0).then_some(avg)
}

/// Observed bars over expected bars, clamped to [0, 1].
pub fn coverage(observed: usize, expected: usize) -> Option<f64> {
    if expected == 0 {
        return None;
    }
    Some((observed as f64 / expected as f64).min(1.0))
}

/// Fraction of consecutive-unchanged closes, in [0, 1]. A high value flags
/// stale quotes or halted trading.
pub fn stale_ratio(closes: &[f64]) -> Option<f64> {
    if closes.len() < 2 {
        return None;
    }
    let unchanged = closes.windows(2).filter(|w| w[0] == w[1]).count();
    Some(unchanged as f64 / (closes.len() - 1) as f64)
}

fn log_returns(closes: &[f64], window: usize) -> Vec<f64> {
    let start = closes.len().saturating_sub(window + 1);
    closes[start..]
        .windows(2)
        .filter(|w| w[0] > 0.0 && w[1] > 0.0)
        .map(|w| (w[1] / w[0]).ln())
        .filter(|r| r.is_finite())
        .collect()
}

fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    let sd = var.sqrt();
    sd.is_finite().then_some(sd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn make_bars(closes: &[f64]) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                date: start + Duration::days(i as i64),
                open: close,
                high: close * 1.01,
                low: close * 0.99,
                close,
                volume: 10_000.0,
            })
            .collect()
    }

    #[test]
    fn test_sma() {
        let closes: Vec<f64> = (1..=30).map(|i| i as f64).collect();
        // Last 20 closes are 11..=30, mean 20.5
        assert_eq!(sma(&closes, 20), Some(20.5));
        assert_eq!(sma(&closes, 50), None);
    }

    #[test]
    fn test_rsi_all_gains_is_100() {
        let closes: Vec<f64> = (1..=30).map(|i| i as f64).collect();
        assert_eq!(rsi(&closes, 14), Some(100.0));
    }

    #[test]
    fn test_rsi_flat_series() {
        let closes = vec![50.0; 30];
        // No gains and no losses: avg_loss == 0 maps to 100 by convention
        assert_eq!(rsi(&closes, 14), Some(100.0));
    }

    #[test]
    fn test_rsi_short_series() {
        let closes = vec![1.0; 14];
        assert_eq!(rsi(&closes, 14), None);
    }

    #[test]
    fn test_momentum() {
        let mut closes = vec![100.0; 64];
        closes[0] = 80.0;
        // 63 bars back from the last index is index 0
        let m = momentum(&closes, 63).unwrap();
        assert!((m - 25.0).abs() < 1e-9);
        assert_eq!(momentum(&closes, 252), None);
    }

    #[test]
    fn test_max_drawdown() {
        let closes = vec![100.0, 120.0, 60.0, 90.0];
        let dd = max_drawdown(&closes, 252).unwrap();
        assert!((dd - 0.5).abs() < 1e-9); // 120 -> 60
    }

    #[test]
    fn test_max_drawdown_monotonic_series() {
        let closes: Vec<f64> = (1..=50).map(|i| i as f64).collect();
        assert_eq!(max_drawdown(&closes, 252), Some(0.0));
    }

    #[test]
    fn test_zscore() {
        let mut closes = vec![100.0; 25];
        *closes.last_mut().unwrap() = 110.0;
        let z = zscore(&closes, 20).unwrap();
        assert!(z > 3.0);

        // Zero variance has no defined z-score
        assert_eq!(zscore(&vec![100.0; 25], 20), None);
    }

    #[test]
    fn test_coverage() {
        assert_eq!(coverage(95, 100), Some(0.95));
        assert_eq!(coverage(120, 100), Some(1.0));
        assert_eq!(coverage(5, 0), None);
    }

    #[test]
    fn test_stale_ratio() {
        let closes = vec![1.0, 1.0, 2.0, 2.0, 3.0];
        // 2 unchanged transitions out of 4
        assert_eq!(stale_ratio(&closes), Some(0.5));
        assert_eq!(stale_ratio(&[1.0]), None);
    }

    #[test]
    fn test_short_series_degrades_per_metric() {
        let bars = make_bars(&[10.0, 10.5, 10.2, 10.8, 11.0]);
        let features = PriceFeatures::compute(&bars, 5);

        assert_eq!(features.last_price, Some(11.0));
        assert_eq!(features.coverage, Some(1.0));
        assert!(features.stale_ratio.is_some());
        // Everything windowed is unavailable, but nothing panicked
        assert_eq!(features.sma_20, None);
        assert_eq!(features.rsi_14, None);
        assert_eq!(features.momentum_63d, None);
        assert_eq!(features.volatility_1y, None);
        assert_eq!(features.zscore_20d, None);
    }

    #[test]
    fn test_empty_series() {
        let features = PriceFeatures::compute(&[], 252);
        assert_eq!(features.last_price, None);
        assert_eq!(features.history_bars, 0);
        assert_eq!(features.coverage, Some(0.0));
    }

    #[test]
    fn test_full_series_computes_everything() {
        let closes: Vec<f64> = (0..300)
            .map(|i| 100.0 + (i as f64 * 0.1) + ((i % 7) as f64 - 3.0))
            .collect();
        let bars = make_bars(&closes);
        let features = PriceFeatures::compute(&bars, 300);

        assert!(features.sma_200.is_some());
        assert!(features.rsi_14.is_some());
        assert!(features.momentum_252d.is_some());
        assert!(features.volatility_1y.is_some());
        assert!(features.max_drawdown_1y.is_some());
        assert!(features.downside_deviation.is_some());
        assert!(features.adv_usd.is_some());
    }

    #[test]
    fn test_apply_to_preserves_fundamentals() {
        let bars = make_bars(&(1..=60).map(|i| i as f64).collect::<Vec<_>>());
        let features = PriceFeatures::compute(&bars, 60);

        let mut attrs = RawAttributes {
            roe: Some(18.0),
            adv_usd: Some(999.0),
            ..Default::default()
        };
        features.apply_to(&mut attrs);

        assert_eq!(attrs.roe, Some(18.0));
        assert_eq!(attrs.sma_20, features.sma_20);
        // Computed ADV wins over the collector-provided figure
        assert_eq!(attrs.adv_usd, features.adv_usd);
    }
}
