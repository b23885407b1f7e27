//! Average True Range with Wilder smoothing.
//!
//! The engine only ever needs today's value, to fill an unknown snapshot
//! ATR, so this folds the true-range series instead of materialising it.

use crate::domain::PriceBar;

/// max(high - low, |high - prev_close|, |low - prev_close|)
fn true_range(bar: &PriceBar, prev_close: f64) -> f64 {
    (bar.high - bar.low)
        .max((bar.high - prev_close).abs())
        .max((bar.low - prev_close).abs())
}

/// Latest Wilder ATR over `bars`.
///
/// The first bar has no previous close, so the seed is the mean of the
/// `period` true ranges starting at the second bar. `None` with fewer than
/// `period + 1` bars or when a range is not finite.
pub fn latest_atr(bars: &[PriceBar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() <= period {
        return None;
    }
    let mut ranges = bars.windows(2).map(|w| true_range(&w[1], w[0].close));
    let seed = ranges.by_ref().take(period).sum::<f64>() / period as f64;
    let alpha = 1.0 / period as f64;
    let atr = ranges.fold(seed, |atr, tr| atr + alpha * (tr - atr));
    atr.is_finite().then_some(atr)
}
