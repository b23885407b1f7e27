//! Extension guards: room to the next resistance, stretch above MA25, and
//! supply overhead of the final target.

use super::{Guard, GuardContext, GuardVerdict};
use crate::config::GuardConfig;
use crate::risk::wall_between;
use crate::telemetry::{BlockCode, GuardSamples};

/// Reward to the next resistance must clear an ATR and a percent floor.
///
/// When the nearest level sits inside `too_close_atr`, the second level is
/// judged instead.
#[derive(Debug, Clone)]
pub struct HeadroomGuard {
    min_atr: f64,
    min_pct: f64,
    too_close_atr: f64,
}

impl HeadroomGuard {
    pub fn new(config: &GuardConfig) -> Self {
        Self {
            min_atr: config.min_headroom_atr,
            min_pct: config.min_headroom_pct,
            too_close_atr: config.too_close_atr,
        }
    }
}

impl Guard for HeadroomGuard {
    fn name(&self) -> &'static str {
        "headroom"
    }

    fn evaluate(&self, ctx: &GuardContext<'_>, samples: &mut GuardSamples) -> GuardVerdict {
        let mut above = ctx.resistances.iter().copied().filter(|r| *r > ctx.entry);
        let Some(first) = above.next() else {
            return GuardVerdict::pass("no overhead resistance");
        };
        let mut level = first;
        let mut retargeted = false;
        if first - ctx.entry < self.too_close_atr * ctx.atr {
            if let Some(second) = above.next() {
                level = second;
                retargeted = true;
            }
        }

        let headroom = level - ctx.entry;
        let atr_units = headroom / ctx.atr;
        let pct = headroom / ctx.entry * 100.0;
        samples.record_headroom(atr_units, pct);

        let verdict = if atr_units < self.min_atr || pct < self.min_pct {
            GuardVerdict::veto(
                BlockCode::InsufficientHeadroom,
                format!(
                    "headroom to {level:.2} is {atr_units:.2} ATR / {pct:.2}%, need {:.2} ATR and {:.2}%",
                    self.min_atr, self.min_pct
                ),
            )
        } else {
            GuardVerdict::pass(format!(
                "headroom {atr_units:.2} ATR / {pct:.2}% to {level:.2}"
            ))
        };
        verdict
            .with_detail("level", level)
            .with_detail("headroom_atr", atr_units)
            .with_detail("headroom_pct", pct)
            .with_detail("retargeted", if retargeted { 1.0 } else { 0.0 })
    }
}

/// Price may not be stretched too far above MA25 in ATR units.
#[derive(Debug, Clone)]
pub struct Ma25DistanceGuard {
    max_atr: f64,
    margin_atr: f64,
}

impl Ma25DistanceGuard {
    pub fn new(config: &GuardConfig) -> Self {
        Self {
            max_atr: config.max_ma25_atr,
            margin_atr: config.ma25_margin_atr,
        }
    }
}

impl Guard for Ma25DistanceGuard {
    fn name(&self) -> &'static str {
        "ma25_distance"
    }

    fn evaluate(&self, ctx: &GuardContext<'_>, samples: &mut GuardSamples) -> GuardVerdict {
        let Some(ma25) = ctx.structure.averages.ma25 else {
            return GuardVerdict::pass("MA25 unknown");
        };
        let distance = (ctx.entry - ma25) / ctx.atr;
        samples.record_ma25_distance(distance);
        let cap = self.max_atr + self.margin_atr;
        let verdict = if distance > cap {
            GuardVerdict::veto(
                BlockCode::Ma25Extension,
                format!("{distance:.2} ATR above MA25 {ma25:.2}, cap {cap:.2}"),
            )
        } else {
            GuardVerdict::pass(format!("{distance:.2} ATR from MA25"))
        };
        verdict
            .with_detail("ma25", ma25)
            .with_detail("distance_atr", distance)
    }
}

/// Re-check for supply between entry and the final, possibly lifted, target.
#[derive(Debug, Clone, Copy, Default)]
pub struct SupplyWallGuard;

impl Guard for SupplyWallGuard {
    fn name(&self) -> &'static str {
        "supply_wall"
    }

    fn evaluate(&self, ctx: &GuardContext<'_>, _samples: &mut GuardSamples) -> GuardVerdict {
        match wall_between(ctx.walls, ctx.entry, ctx.target) {
            Some(wall) => GuardVerdict::veto(
                BlockCode::SupplyWall,
                format!("{wall} below target {:.2}", ctx.target),
            )
            .with_detail("wall_low", wall.low)
            .with_detail("wall_high", wall.high)
            .with_detail(
                "wall_distance_atr",
                (wall.overhead_from(ctx.entry) - ctx.entry) / ctx.atr,
            ),
            None => GuardVerdict::pass("no supply wall before target"),
        }
    }
}
