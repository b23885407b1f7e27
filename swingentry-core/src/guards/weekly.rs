//! Weekly-range position guard.
//!
//! Top of the ~12-week range: veto (slightly more room in a strong uptrend).
//! Bottom band: veto only as a falling knife, i.e. when the weekly trend is
//! independently down (price < fast weekly MA < slow weekly MA). A bottom-band
//! price in a weekly uptrend is a dip in a strong name and passes.

use super::{Guard, GuardContext, GuardVerdict};
use crate::config::GuardConfig;
use crate::indicators::{resample_weekly, weekly_close_sma};
use crate::structure::Trend;
use crate::telemetry::{BlockCode, GuardSamples};

#[derive(Debug, Clone)]
pub struct WeeklyRangeGuard {
    weeks: usize,
    top_fraction: f64,
    strong_up_bump: f64,
    bottom_fraction: f64,
    fast_ma: usize,
    slow_ma: usize,
}

impl WeeklyRangeGuard {
    pub fn new(config: &GuardConfig) -> Self {
        Self {
            weeks: config.weekly_range_weeks,
            top_fraction: config.weekly_top_fraction,
            strong_up_bump: config.strong_up_top_bump,
            bottom_fraction: config.weekly_bottom_fraction,
            fast_ma: config.weekly_fast_ma,
            slow_ma: config.weekly_slow_ma,
        }
    }
}

impl Guard for WeeklyRangeGuard {
    fn name(&self) -> &'static str {
        "weekly_range"
    }

    fn evaluate(&self, ctx: &GuardContext<'_>, _samples: &mut GuardSamples) -> GuardVerdict {
        let weekly = resample_weekly(&ctx.input.bars);
        if self.weeks == 0 || weekly.len() < self.weeks {
            return GuardVerdict::pass(format!(
                "skipped: {} weeks of history, need {}",
                weekly.len(),
                self.weeks
            ));
        }

        let window = &weekly[weekly.len() - self.weeks..];
        let high = window.iter().map(|w| w.high).fold(f64::NEG_INFINITY, f64::max);
        let low = window.iter().map(|w| w.low).fold(f64::INFINITY, f64::min);
        let range = high - low;
        if !(range.is_finite() && range > 0.0) {
            return GuardVerdict::pass("weekly range is flat");
        }
        let position = (ctx.entry - low) / range;

        let top = if ctx.structure.trend == Trend::StrongUp {
            self.top_fraction + self.strong_up_bump
        } else {
            self.top_fraction
        };
        if position > top {
            return GuardVerdict::veto(
                BlockCode::WeeklyTop,
                format!(
                    "price at {:.0}% of {}-week range, limit {:.0}%",
                    position * 100.0,
                    self.weeks,
                    top * 100.0
                ),
            )
            .with_detail("position", position)
            .with_detail("limit", top);
        }

        if position <= self.bottom_fraction {
            let fast = weekly_close_sma(&weekly, self.fast_ma);
            let slow = weekly_close_sma(&weekly, self.slow_ma);
            if let (Some(fast), Some(slow)) = (fast, slow) {
                if ctx.entry < fast && fast < slow {
                    return GuardVerdict::veto(
                        BlockCode::FallingKnife,
                        format!(
                            "falling knife: bottom of weekly range with price {:.2} < {}w MA {fast:.2} < {}w MA {slow:.2}",
                            ctx.entry, self.fast_ma, self.slow_ma
                        ),
                    )
                    .with_detail("position", position)
                    .with_detail("weekly_fast_ma", fast)
                    .with_detail("weekly_slow_ma", slow);
                }
            }
            return GuardVerdict::pass(format!(
                "bottom {:.0}% of weekly range, weekly trend not confirmed down",
                position * 100.0
            ))
            .with_detail("position", position);
        }

        GuardVerdict::pass(format!("price at {:.0}% of weekly range", position * 100.0))
            .with_detail("position", position)
    }
}
