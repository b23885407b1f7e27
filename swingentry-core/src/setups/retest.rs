//! Retest of a broken pivot high that now acts as support.

use super::{
    DetectorOutcome, RetestDiagnostics, SetupCandidate, SetupContext, SetupDetector,
    SetupDiagnostics, SetupKind, WaitReason,
};
use crate::config::RetestConfig;
use crate::indicators::average_volume;
use crate::levels::{highest_high, lowest_low, pivot_highs};

#[derive(Debug, Clone)]
pub struct RetestDetector {
    config: RetestConfig,
}

impl RetestDetector {
    pub fn new(config: RetestConfig) -> Self {
        Self { config }
    }
}

impl SetupDetector for RetestDetector {
    fn kind(&self) -> SetupKind {
        SetupKind::Retest
    }

    fn min_bars(&self) -> usize {
        self.config.min_bars.max(8)
    }

    fn detect(&self, ctx: &SetupContext<'_>) -> DetectorOutcome {
        let c = &self.config;
        let bars = &ctx.input.bars;
        let n = bars.len();
        if n < self.min_bars() {
            return DetectorOutcome::insufficient(n, self.min_bars());
        }
        let atr = ctx.atr;
        let entry = ctx.entry();
        let cur = &bars[n - 1];
        let earliest = (n - 1).saturating_sub(c.lookback);

        // Most recent pivot high that a later close (before today) broke through.
        let broken = pivot_highs(&bars[..n - 1], 2, 2)
            .into_iter()
            .rev()
            .filter(|&p| p >= earliest)
            .find_map(|p| {
                let level = bars[p].high;
                let through = level * (1.0 + c.min_through_pct / 100.0);
                (p + 1..n - 1)
                    .find(|&j| bars[j].close >= through)
                    .map(|j| (level, j))
            });
        let Some((level, break_idx)) = broken else {
            return DetectorOutcome::not_ready(WaitReason::NoRetest, "no broken pivot high");
        };
        let mut diag = RetestDiagnostics {
            level: Some(level),
            bars_since_break: Some(n - 1 - break_idx),
            ..Default::default()
        };
        let fail = |reason: WaitReason, detail: String, diag: &RetestDiagnostics| {
            DetectorOutcome::not_ready(reason, detail)
                .with_diagnostics(SetupDiagnostics::Retest(diag.clone()))
        };

        let floor = level * (1.0 - c.hold_tolerance_pct / 100.0);
        if let Some(lost) = bars[break_idx..].iter().find(|b| b.close < floor) {
            return fail(
                WaitReason::LevelLost,
                format!("closed {:.2} below {level:.2} on {}", lost.close, lost.date),
                &diag,
            );
        }

        let touch_ceiling = level * (1.0 + c.touch_band_pct / 100.0);
        let touch = (break_idx + 1..n).rev().find(|&j| bars[j].low <= touch_ceiling);
        let Some(touch_idx) = touch else {
            return fail(
                WaitReason::NoRetest,
                format!("no pullback into {level:.2} since the break"),
                &diag,
            );
        };
        let touch_age = n - 1 - touch_idx;
        diag.touch_age = Some(touch_age);
        if touch_age > c.max_touch_age {
            return fail(
                WaitReason::NoRetest,
                format!("last touch {touch_age} bars ago (max {})", c.max_touch_age),
                &diag,
            );
        }

        if !(cur.is_green() && cur.close > level) {
            return fail(
                WaitReason::WeakClose,
                format!("bar not green above {level:.2}"),
                &diag,
            );
        }

        diag.volume_ratio = average_volume(bars, n - 1, c.volume_window).map(|avg| cur.volume / avg);
        if !diag.volume_ratio.is_some_and(|r| r >= c.volume_ratio) {
            return fail(
                WaitReason::WeakVolume,
                format!("volume below {:.1}x average", c.volume_ratio),
                &diag,
            );
        }

        let low_since = lowest_low(bars, break_idx + 1, n)
            .map(|(_, low)| low)
            .unwrap_or(level);
        let stop = low_since.min(level) - c.stop_atr * atr;
        let post_break_high = highest_high(bars, break_idx, n)
            .map(|(_, h)| h)
            .unwrap_or(entry);
        let target = (entry + c.target_atr * atr).max(post_break_high);

        DetectorOutcome::Triggered(SetupCandidate {
            kind: SetupKind::Retest,
            rationale: format!(
                "retest: held broken level {level:.2}, touched {touch_age} bars ago, bounced green"
            ),
            stop,
            target,
            nearest_resistance: ctx.resistances.first().copied(),
            diagnostics: SetupDiagnostics::Retest(diag),
        })
    }
}
