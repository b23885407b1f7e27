//! Wilder RSI over closes.

use crate::domain::PriceBar;

/// RSI at every bar; `None` for the first `period` bars.
///
/// Flat averages read as 50, no losses as 100.
pub fn rsi_series(bars: &[PriceBar], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; bars.len()];
    if period == 0 || bars.len() <= period {
        return out;
    }
    let changes: Vec<f64> = bars.windows(2).map(|w| w[1].close - w[0].close).collect();
    let (gain, loss) = changes[..period]
        .iter()
        .fold((0.0, 0.0), |(g, l), &ch| (g + ch.max(0.0), l + (-ch).max(0.0)));
    let (mut gain, mut loss) = (gain / period as f64, loss / period as f64);
    out[period] = rsi_from(gain, loss);

    let alpha = 1.0 / period as f64;
    for (i, &ch) in changes.iter().enumerate().skip(period) {
        gain += alpha * (ch.max(0.0) - gain);
        loss += alpha * ((-ch).max(0.0) - loss);
        out[i + 1] = rsi_from(gain, loss);
    }
    out
}

pub fn latest_rsi(bars: &[PriceBar], period: usize) -> Option<f64> {
    rsi_series(bars, period).last().copied().flatten()
}

fn rsi_from(gain: f64, loss: f64) -> Option<f64> {
    let rsi = match (gain == 0.0, loss == 0.0) {
        (true, true) => 50.0,
        (false, true) => 100.0,
        _ => 100.0 - 100.0 / (1.0 + gain / loss),
    };
    rsi.is_finite().then_some(rsi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars};

    #[test]
    fn warmup_is_unknown() {
        let rsi = rsi_series(&make_bars(&[44.0, 44.34, 44.09, 43.61, 44.33]), 3);
        assert_eq!(&rsi[..3], &[None, None, None]);
        // Seed: gains 0.34, losses 0.73 over three changes.
        assert_approx(rsi[3].unwrap(), 100.0 - 100.0 / (1.0 + 0.34 / 0.73), 1e-9);
        assert!(rsi[4].unwrap() > rsi[3].unwrap());
    }

    #[test]
    fn one_way_moves_hit_the_bounds() {
        let up = make_bars(&[100.0, 101.0, 102.0, 103.0, 104.0]);
        let down = make_bars(&[104.0, 103.0, 102.0, 101.0, 100.0]);
        assert_eq!(latest_rsi(&up, 3), Some(100.0));
        assert_eq!(latest_rsi(&down, 3), Some(0.0));
        assert_eq!(latest_rsi(&make_bars(&[50.0; 5]), 3), Some(50.0));
    }

    #[test]
    fn stays_in_range_on_whipsaw() {
        let bars = make_bars(&[100.0, 105.0, 98.0, 110.0, 95.0, 115.0, 90.0, 120.0]);
        for v in rsi_series(&bars, 3).into_iter().flatten() {
            assert!((0.0..=100.0).contains(&v), "{v}");
        }
    }

    #[test]
    fn short_series_has_no_value() {
        assert_eq!(latest_rsi(&make_bars(&[1.0, 2.0, 3.0]), 3), None);
    }
}
