//! Supply walls: overhead zones where sellers previously took control.
//!
//! Two sources inside the lookback window:
//! - gap-down: today's high below yesterday's low by at least the minimum
//!   gap; the zone is the unfilled gap.
//! - volume rejection: a red bar on heavy volume with a long upper wick;
//!   the zone runs from the top of the body to the high.
//!
//! A zone that a later bar closed above has been absorbed and is dropped.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::RiskConfig;
use crate::domain::PriceBar;
use crate::indicators::average_volume;

const VOLUME_WINDOW: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WallKind {
    GapDown,
    VolumeRejection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplyWall {
    pub kind: WallKind,
    pub date: NaiveDate,
    pub low: f64,
    pub high: f64,
}

impl std::fmt::Display for SupplyWall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            WallKind::GapDown => "gap-down",
            WallKind::VolumeRejection => "volume rejection",
        };
        write!(f, "{kind} wall {:.2}-{:.2} ({})", self.low, self.high, self.date)
    }
}

/// Unabsorbed supply walls in the last `wall_lookback` bars, oldest first.
pub fn detect_walls(bars: &[PriceBar], config: &RiskConfig) -> Vec<SupplyWall> {
    let n = bars.len();
    let start = n.saturating_sub(config.wall_lookback).max(1);
    let mut walls = Vec::new();

    for i in start..n {
        let bar = &bars[i];
        let prev = &bars[i - 1];

        let gap_pct = (prev.low - bar.high) / prev.low * 100.0;
        if bar.high < prev.low && gap_pct >= config.wall_min_gap_pct {
            walls.push(SupplyWall {
                kind: WallKind::GapDown,
                date: bar.date,
                low: bar.high,
                high: prev.low,
            });
        }

        let heavy = average_volume(bars, i, VOLUME_WINDOW)
            .is_some_and(|avg| bar.volume >= config.wall_volume_mult * avg);
        let range = bar.range();
        if bar.is_red()
            && heavy
            && range > 0.0
            && bar.upper_wick() / range >= config.wall_wick_fraction
        {
            walls.push(SupplyWall {
                kind: WallKind::VolumeRejection,
                date: bar.date,
                low: bar.open.max(bar.close),
                high: bar.high,
            });
        }
    }

    walls
        .into_iter()
        .filter(|w| {
            !bars
                .iter()
                .filter(|b| b.date > w.date)
                .any(|b| b.close > w.high)
        })
        .collect()
}

impl SupplyWall {
    /// Where the wall starts to bite for a position opened at `entry`: its
    /// lower edge, or `entry` itself when the entry sits inside the zone.
    pub fn overhead_from(&self, entry: f64) -> f64 {
        self.low.max(entry)
    }
}

/// Nearest wall overlapping the open range `(entry, target)`, including one
/// the entry sits inside.
pub fn wall_between(walls: &[SupplyWall], entry: f64, target: f64) -> Option<&SupplyWall> {
    walls
        .iter()
        .filter(|w| w.high > entry && w.low < target)
        .min_by(|a, b| a.overhead_from(entry).total_cmp(&b.overhead_from(entry)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::setups::fixtures::{bar, flat};

    fn config() -> RiskConfig {
        EngineConfig::balanced().risk
    }

    #[test]
    fn gap_down_creates_wall() {
        let mut bars = flat(25, 110.0, 1_000.0);
        bars.push(bar(25, 104.0, 105.0, 103.0, 103.5, 1_000.0));
        bars.push(bar(26, 103.5, 104.0, 102.5, 103.0, 1_000.0));
        let walls = detect_walls(&bars, &config());
        assert_eq!(walls.len(), 1);
        assert_eq!(walls[0].kind, WallKind::GapDown);
        assert_eq!((walls[0].low, walls[0].high), (105.0, 109.5));
    }

    #[test]
    fn heavy_rejection_bar_creates_wall() {
        let mut bars = flat(25, 100.0, 1_000.0);
        bars.push(bar(25, 101.0, 104.0, 99.8, 100.2, 3_000.0));
        bars.push(bar(26, 100.2, 100.6, 99.7, 100.1, 1_000.0));
        let walls = detect_walls(&bars, &config());
        assert_eq!(walls.len(), 1);
        assert_eq!(walls[0].kind, WallKind::VolumeRejection);
        assert_eq!((walls[0].low, walls[0].high), (101.0, 104.0));
        assert!(wall_between(&walls, 100.1, 103.0).is_some());
        assert!(wall_between(&walls, 100.1, 100.9).is_none());
    }

    #[test]
    fn partly_filled_gap_around_entry_is_overhead() {
        let mut bars = flat(25, 110.0, 1_000.0);
        bars.push(bar(25, 104.0, 105.0, 103.0, 103.5, 1_000.0));
        bars.push(bar(26, 103.5, 107.0, 103.4, 106.5, 1_000.0));
        let walls = detect_walls(&bars, &config());
        assert_eq!(walls.len(), 1);
        assert_eq!((walls[0].low, walls[0].high), (105.0, 109.5));

        let wall = wall_between(&walls, 106.5, 112.0).unwrap();
        assert_eq!(wall.overhead_from(106.5), 106.5);
        // Entry above the zone, or a target under it: no wall in the way.
        assert!(wall_between(&walls, 109.6, 112.0).is_none());
        assert!(wall_between(&walls, 103.0, 104.9).is_none());
    }

    #[test]
    fn nearest_wall_wins() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let walls = vec![
            SupplyWall {
                kind: WallKind::VolumeRejection,
                date: d,
                low: 103.0,
                high: 104.0,
            },
            SupplyWall {
                kind: WallKind::GapDown,
                date: d,
                low: 99.0,
                high: 101.5,
            },
        ];
        let wall = wall_between(&walls, 100.0, 105.0).unwrap();
        assert_eq!(wall.kind, WallKind::GapDown);
    }

    #[test]
    fn absorbed_wall_is_ignored() {
        let mut bars = flat(25, 100.0, 1_000.0);
        bars.push(bar(25, 101.0, 104.0, 99.8, 100.2, 3_000.0));
        bars.push(bar(26, 100.2, 104.8, 100.0, 104.5, 1_000.0));
        assert!(detect_walls(&bars, &config()).is_empty());
    }

    #[test]
    fn old_walls_fall_out_of_lookback() {
        let mut bars = flat(25, 110.0, 1_000.0);
        bars.push(bar(25, 104.0, 105.0, 103.0, 103.5, 1_000.0));
        let mut tail = flat(70, 103.5, 1_000.0);
        for (k, b) in tail.iter_mut().enumerate() {
            b.date = bars[25].date + chrono::Duration::days(k as i64 + 1);
        }
        bars.extend(tail);
        assert!(detect_walls(&bars, &config()).is_empty());
    }
}
