//! Market structure: trend regime, moving-average stack, recent range.

use serde::{Deserialize, Serialize};

use crate::domain::MarketInput;
use crate::indicators::sma_at;

/// Trend regime derived from the price / moving-average score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Trend {
    StrongUp,
    Up,
    WeakUp,
    Down,
}

impl Trend {
    pub fn from_score(score: u8) -> Self {
        match score {
            0 => Trend::Down,
            1 => Trend::WeakUp,
            2 => Trend::Up,
            _ => Trend::StrongUp,
        }
    }

    /// Up or StrongUp.
    pub fn is_up(self) -> bool {
        matches!(self, Trend::StrongUp | Trend::Up)
    }
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Trend::StrongUp => "STRONG_UP",
            Trend::Up => "UP",
            Trend::WeakUp => "WEAK_UP",
            Trend::Down => "DOWN",
        };
        f.write_str(s)
    }
}

/// Moving averages resolved from the snapshot with bar-derived fallbacks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MovingAverages {
    pub ma5: Option<f64>,
    pub ma20: Option<f64>,
    pub ma25: Option<f64>,
    pub ma50: Option<f64>,
    pub ma75: Option<f64>,
    pub ma200: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketStructure {
    pub trend: Trend,
    pub score: u8,
    pub averages: MovingAverages,
    pub stacked_bullish: bool,
    pub recent_high: f64,
    pub recent_low: f64,
    pub price: f64,
}

/// Bars in the recent-range window.
pub const RECENT_WINDOW: usize = 20;

impl MarketStructure {
    pub fn analyze(input: &MarketInput) -> Self {
        let snap = &input.snapshot;
        let bars = &input.bars;
        let n = bars.len();
        let ma = |known: Option<f64>, period: usize| known.or_else(|| sma_at(bars, n, period));
        let averages = MovingAverages {
            ma5: ma(snap.ma5, 5),
            ma20: ma(snap.ma20, 20),
            ma25: ma(snap.ma25, 25),
            ma50: ma(snap.ma50, 50),
            ma75: ma(snap.ma75, 75),
            ma200: ma(snap.ma200, 200),
        };
        let price = snap.price;

        let above = |a: Option<f64>, b: Option<f64>| matches!((a, b), (Some(a), Some(b)) if a > b);
        let checks = [
            above(Some(price), averages.ma25),
            above(Some(price), averages.ma50),
            above(averages.ma25, averages.ma50),
            above(averages.ma50, averages.ma200),
        ];
        let score = checks.iter().filter(|c| **c).count() as u8;

        let mut stacked_bullish = above(Some(price), averages.ma5)
            && above(averages.ma5, averages.ma25)
            && above(averages.ma25, averages.ma50);
        if averages.ma75.is_some() && averages.ma200.is_some() {
            stacked_bullish = stacked_bullish
                && above(averages.ma50, averages.ma75)
                && above(averages.ma75, averages.ma200);
        }

        let recent = &bars[n.saturating_sub(RECENT_WINDOW)..];
        let recent_high = recent.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
        let recent_low = recent.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);

        Self {
            trend: Trend::from_score(score),
            score,
            averages,
            stacked_bullish,
            recent_high: if recent_high.is_finite() { recent_high } else { price },
            recent_low: if recent_low.is_finite() { recent_low } else { price },
            price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RawSnapshot;
    use crate::indicators::make_bars;

    fn input(raw: RawSnapshot, closes: &[f64]) -> MarketInput {
        MarketInput::validate(&raw, &make_bars(closes), 1).unwrap()
    }

    #[test]
    fn strong_up_from_snapshot_averages() {
        let raw = RawSnapshot {
            price: Some(98.0),
            atr14: Some(1.2),
            ma5: Some(97.9),
            ma25: Some(96.86),
            ma50: Some(94.0),
            ..Default::default()
        };
        let s = MarketStructure::analyze(&input(raw, &[98.0; 10]));
        assert_eq!(s.score, 3);
        assert_eq!(s.trend, Trend::StrongUp);
        assert!(s.stacked_bullish);
    }

    #[test]
    fn unknown_averages_do_not_score() {
        let raw = RawSnapshot {
            price: Some(50.0),
            atr14: Some(1.0),
            ..Default::default()
        };
        let s = MarketStructure::analyze(&input(raw, &[50.0; 10]));
        assert_eq!(s.averages.ma25, None);
        assert_eq!(s.score, 0);
        assert_eq!(s.trend, Trend::Down);
        assert!(!s.stacked_bullish);
    }

    #[test]
    fn fallback_averages_from_bars() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let raw = RawSnapshot {
            atr14: Some(1.0),
            ..Default::default()
        };
        let s = MarketStructure::analyze(&input(raw, &closes));
        // price 159 > MA25 147 > MA50 134.5; MA200 unknown
        assert_eq!(s.averages.ma25, Some(147.0));
        assert_eq!(s.score, 3);
        assert_eq!(s.recent_high, 160.0);
        assert_eq!(s.recent_low, 138.0);
    }

    #[test]
    fn trend_regimes() {
        assert_eq!(Trend::from_score(4), Trend::StrongUp);
        assert_eq!(Trend::from_score(2), Trend::Up);
        assert!(Trend::Up.is_up());
        assert!(!Trend::WeakUp.is_up());
        assert_eq!(Trend::WeakUp.to_string(), "WEAK_UP");
    }
}
