//! Indicators over validated bars.
//!
//! The snapshot normally carries today's values; these fill unknown fields
//! and supply the history a detector needs beyond the latest value (RSI
//! divergence, prior-bar MA, volume baselines). No value at bar t reads
//! bars after t.

pub mod atr;
pub mod rsi;
pub mod weekly;

pub use atr::latest_atr;
pub use rsi::{latest_rsi, rsi_series};
pub use weekly::{resample_weekly, weekly_close_sma, WeeklyBar};

use crate::domain::PriceBar;

/// SMA of the `period` closes ending at `end` (exclusive).
///
/// `None` when fewer than `period` bars precede `end` or the window holds a
/// non-finite close.
pub fn sma_at(bars: &[PriceBar], end: usize, period: usize) -> Option<f64> {
    if period == 0 || end > bars.len() || end < period {
        return None;
    }
    let window = &bars[end - period..end];
    if window.iter().any(|b| !b.close.is_finite()) {
        return None;
    }
    Some(window.iter().map(|b| b.close).sum::<f64>() / period as f64)
}

/// Mean volume over `bars[end - n .. end]`.
///
/// Returns `None` when the window does not fit or the mean is not positive.
pub fn average_volume(bars: &[PriceBar], end: usize, n: usize) -> Option<f64> {
    if n == 0 || end > bars.len() || end < n {
        return None;
    }
    let sum: f64 = bars[end - n..end].iter().map(|b| b.volume).sum();
    let avg = sum / n as f64;
    (avg.is_finite() && avg > 0.0).then_some(avg)
}

/// Create synthetic bars from close prices for testing.
///
/// Generates plausible OHLV: open = prev_close (or close for first bar),
/// high = max(open,close) + 1.0, low = min(open,close) - 1.0, volume = 1000.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<PriceBar> {
    let base_date = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            let high = open.max(close) + 1.0;
            let low = open.min(close) - 1.0;
            PriceBar {
                date: base_date + chrono::Duration::days(i as i64),
                open,
                high,
                low,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_at_window_ends_before_end() {
        let bars = make_bars(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0]);
        assert_approx(sma_at(&bars, 7, 5).unwrap(), 14.0, DEFAULT_EPSILON);
        assert_approx(sma_at(&bars, 6, 5).unwrap(), 13.0, DEFAULT_EPSILON);
        assert!(sma_at(&bars, 4, 5).is_none());
        assert!(sma_at(&bars, 8, 5).is_none());
    }

    #[test]
    fn sma_at_rejects_non_finite_window() {
        let mut bars = make_bars(&[10.0, 11.0, 12.0, 13.0]);
        bars[1].close = f64::NAN;
        assert!(sma_at(&bars, 3, 3).is_none());
        assert_approx(sma_at(&bars, 4, 2).unwrap(), 12.5, DEFAULT_EPSILON);
    }

    #[test]
    fn average_volume_window() {
        let mut bars = make_bars(&[10.0; 6]);
        for (i, b) in bars.iter_mut().enumerate() {
            b.volume = (i + 1) as f64 * 100.0;
        }
        // bars[2..5] volumes 300, 400, 500
        assert_approx(average_volume(&bars, 5, 3).unwrap(), 400.0, DEFAULT_EPSILON);
        assert!(average_volume(&bars, 2, 3).is_none());
        assert!(average_volume(&bars, 7, 3).is_none());
    }
}
