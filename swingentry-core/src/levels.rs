//! Price levels: pivots, resistance/support clustering, touch counting.
//!
//! All percentage tolerances in this module are expressed in percent
//! (`1.5` means 1.5%).

use crate::domain::PriceBar;

/// Indices of pivot highs: bars whose high is strictly greater than the
/// `left` bars before and the `right` bars after.
pub fn pivot_highs(bars: &[PriceBar], left: usize, right: usize) -> Vec<usize> {
    pivots(bars, left, right, |candidate, other| candidate.high > other.high)
}

/// Indices of pivot lows: bars whose low is strictly below its neighbours.
pub fn pivot_lows(bars: &[PriceBar], left: usize, right: usize) -> Vec<usize> {
    pivots(bars, left, right, |candidate, other| candidate.low < other.low)
}

fn pivots<F>(bars: &[PriceBar], left: usize, right: usize, beats: F) -> Vec<usize>
where
    F: Fn(&PriceBar, &PriceBar) -> bool,
{
    let n = bars.len();
    if n < left + right + 1 {
        return Vec::new();
    }
    (left..n - right)
        .filter(|&i| {
            let c = &bars[i];
            !c.is_void()
                && bars[i - left..i].iter().all(|o| beats(c, o))
                && bars[i + 1..=i + right].iter().all(|o| beats(c, o))
        })
        .collect()
}

/// Greedy clustering of price levels.
///
/// Prices are sorted ascending; a price joins the current cluster while it is
/// within `tolerance_pct` of the cluster mean. Returns cluster means,
/// ascending. Non-finite and non-positive inputs are ignored.
pub fn cluster_levels(prices: &[f64], tolerance_pct: f64) -> Vec<f64> {
    let mut sorted: Vec<f64> = prices
        .iter()
        .copied()
        .filter(|p| p.is_finite() && *p > 0.0)
        .collect();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mut clusters: Vec<f64> = Vec::new();
    let mut sum = 0.0;
    let mut count = 0usize;
    for p in sorted {
        if count > 0 {
            let mean = sum / count as f64;
            if (p - mean).abs() / mean * 100.0 <= tolerance_pct {
                sum += p;
                count += 1;
                continue;
            }
            clusters.push(mean);
        }
        sum = p;
        count = 1;
    }
    if count > 0 {
        clusters.push(sum / count as f64);
    }
    clusters
}

/// Clustered resistance strictly above `entry`, nearest first.
///
/// Sources: pivot highs within the last `lookback` bars plus the 52-week
/// high when known.
pub fn resistance_levels(
    bars: &[PriceBar],
    entry: f64,
    high_52w: Option<f64>,
    lookback: usize,
    tolerance_pct: f64,
) -> Vec<f64> {
    let start = bars.len().saturating_sub(lookback);
    let window = &bars[start..];
    let mut raw: Vec<f64> = pivot_highs(window, 2, 2)
        .into_iter()
        .map(|i| window[i].high)
        .collect();
    raw.extend(high_52w);
    cluster_levels(&raw, tolerance_pct)
        .into_iter()
        .filter(|l| *l > entry)
        .collect()
}

/// Clustered support strictly below `entry`, nearest first.
pub fn support_levels(
    bars: &[PriceBar],
    entry: f64,
    lookback: usize,
    tolerance_pct: f64,
) -> Vec<f64> {
    let start = bars.len().saturating_sub(lookback);
    let window = &bars[start..];
    let raw: Vec<f64> = pivot_lows(window, 2, 2)
        .into_iter()
        .map(|i| window[i].low)
        .collect();
    let mut below: Vec<f64> = cluster_levels(&raw, tolerance_pct)
        .into_iter()
        .filter(|l| *l < entry)
        .collect();
    below.reverse();
    below
}

/// Number of pivot lows before index `before` within `tolerance_pct` of `level`.
pub fn pivot_low_touches(
    bars: &[PriceBar],
    level: f64,
    before: usize,
    tolerance_pct: f64,
) -> usize {
    let end = before.min(bars.len());
    pivot_lows(&bars[..end], 2, 2)
        .into_iter()
        .filter(|&i| (bars[i].low - level).abs() / level * 100.0 <= tolerance_pct)
        .count()
}

/// Consecutive higher closes ending at the last bar.
pub fn up_streak(bars: &[PriceBar]) -> usize {
    bars.windows(2)
        .rev()
        .take_while(|w| w[1].close > w[0].close)
        .count()
}

/// Index and value of the highest high in `bars[from..to]` (last wins on ties).
pub fn highest_high(bars: &[PriceBar], from: usize, to: usize) -> Option<(usize, f64)> {
    let to = to.min(bars.len());
    (from..to)
        .filter(|&i| bars[i].high.is_finite())
        .fold(None, |best: Option<(usize, f64)>, i| match best {
            Some((_, h)) if h > bars[i].high => best,
            _ => Some((i, bars[i].high)),
        })
}

/// Index and value of the lowest low in `bars[from..to]` (last wins on ties).
pub fn lowest_low(bars: &[PriceBar], from: usize, to: usize) -> Option<(usize, f64)> {
    let to = to.min(bars.len());
    (from..to)
        .filter(|&i| bars[i].low.is_finite())
        .fold(None, |best: Option<(usize, f64)>, i| match best {
            Some((_, l)) if l < bars[i].low => best,
            _ => Some((i, bars[i].low)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_bars;

    fn zigzag() -> Vec<PriceBar> {
        let highs = [11.0, 12.0, 15.0, 12.0, 11.0, 12.0, 15.1, 12.0, 11.0, 11.5, 12.0];
        let lows = [9.0, 10.0, 13.0, 10.0, 8.0, 10.0, 13.0, 10.0, 9.0, 9.5, 10.0];
        let mut bars = make_bars(&[10.0; 11]);
        for (i, b) in bars.iter_mut().enumerate() {
            b.high = highs[i];
            b.low = lows[i];
            b.open = (highs[i] + lows[i]) / 2.0;
            b.close = b.open;
        }
        bars
    }

    #[test]
    fn pivots_require_strict_extremes() {
        let bars = zigzag();
        assert_eq!(pivot_highs(&bars, 2, 2), vec![2, 6]);
        assert_eq!(pivot_lows(&bars, 2, 2), vec![4, 8]);

        let flat = make_bars(&[10.0; 9]);
        assert!(pivot_highs(&flat, 2, 2).is_empty());
    }

    #[test]
    fn clustering_merges_nearby_levels() {
        let levels = cluster_levels(&[100.0, 100.5, 103.0, f64::NAN, 99.8], 1.0);
        assert_eq!(levels.len(), 2);
        assert!((levels[0] - (99.8 + 100.0 + 100.5) / 3.0).abs() < 1e-9);
        assert_eq!(levels[1], 103.0);
    }

    #[test]
    fn resistance_is_above_entry_ascending() {
        let bars = zigzag();
        let levels = resistance_levels(&bars, 13.0, Some(20.0), 120, 1.0);
        // pivot highs 15.0 and 15.1 cluster, then the 52-week high
        assert_eq!(levels.len(), 2);
        assert!((levels[0] - 15.05).abs() < 1e-9);
        assert_eq!(levels[1], 20.0);
    }

    #[test]
    fn support_is_below_entry_nearest_first() {
        let bars = zigzag();
        let levels = support_levels(&bars, 12.0, 120, 1.0);
        assert_eq!(levels, vec![9.0, 8.0]);
    }

    #[test]
    fn streak_counts_trailing_higher_closes() {
        let bars = make_bars(&[10.0, 9.0, 10.0, 11.0, 12.0]);
        assert_eq!(up_streak(&bars), 3);
        assert_eq!(up_streak(&make_bars(&[10.0, 9.0])), 0);
    }

    #[test]
    fn extremes_over_a_range() {
        let bars = zigzag();
        assert_eq!(highest_high(&bars, 0, 5), Some((2, 15.0)));
        assert_eq!(lowest_low(&bars, 3, 9), Some((4, 8.0)));
        assert!(highest_high(&bars, 5, 5).is_none());
    }
}
