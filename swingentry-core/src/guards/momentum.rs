//! Momentum guards: RSI hard ceiling and the anti-chase up-streak cap.

use super::{Guard, GuardContext, GuardVerdict};
use crate::config::GuardConfig;
use crate::levels::up_streak;
use crate::telemetry::{BlockCode, GuardSamples};

/// Veto when RSI is at or above the hard ceiling.
#[derive(Debug, Clone)]
pub struct RsiCeilingGuard {
    hard_rsi: f64,
}

impl RsiCeilingGuard {
    pub fn new(config: &GuardConfig) -> Self {
        Self {
            hard_rsi: config.hard_rsi,
        }
    }
}

impl Guard for RsiCeilingGuard {
    fn name(&self) -> &'static str {
        "rsi_ceiling"
    }

    fn evaluate(&self, ctx: &GuardContext<'_>, _samples: &mut GuardSamples) -> GuardVerdict {
        match ctx.input.snapshot.rsi {
            None => GuardVerdict::pass("RSI unknown"),
            Some(rsi) if rsi >= self.hard_rsi => GuardVerdict::veto(
                BlockCode::RsiCeiling,
                format!("RSI {rsi:.1} at or above hard ceiling {:.0}", self.hard_rsi),
            )
            .with_detail("rsi", rsi)
            .with_detail("hard_rsi", self.hard_rsi),
            Some(rsi) => GuardVerdict::pass(format!("RSI {rsi:.1} below {:.0}", self.hard_rsi))
                .with_detail("rsi", rsi),
        }
    }
}

/// Veto after too many consecutive higher closes.
#[derive(Debug, Clone)]
pub struct UpStreakGuard {
    max_streak: usize,
}

impl UpStreakGuard {
    pub fn new(config: &GuardConfig) -> Self {
        Self {
            max_streak: config.max_up_streak,
        }
    }
}

impl Guard for UpStreakGuard {
    fn name(&self) -> &'static str {
        "up_streak"
    }

    fn evaluate(&self, ctx: &GuardContext<'_>, _samples: &mut GuardSamples) -> GuardVerdict {
        let streak = up_streak(&ctx.input.bars);
        let verdict = if streak > self.max_streak {
            GuardVerdict::veto(
                BlockCode::UpStreak,
                format!("{streak} straight up days, cap {}", self.max_streak),
            )
        } else {
            GuardVerdict::pass(format!("{streak} up days"))
        };
        verdict.with_detail("streak", streak as f64)
    }
}
