//! MA25 reclaim: yesterday below the 25-day average, today back above it.

use super::{
    DetectorOutcome, ReclaimDiagnostics, SetupCandidate, SetupContext, SetupDetector,
    SetupDiagnostics, SetupKind, WaitReason,
};
use crate::config::ReclaimConfig;
use crate::indicators::{average_volume, sma_at};

const MA_PERIOD: usize = 25;

#[derive(Debug, Clone)]
pub struct ReclaimDetector {
    config: ReclaimConfig,
}

impl ReclaimDetector {
    pub fn new(config: ReclaimConfig) -> Self {
        Self { config }
    }
}

impl SetupDetector for ReclaimDetector {
    fn kind(&self) -> SetupKind {
        SetupKind::Reclaim
    }

    fn min_bars(&self) -> usize {
        self.config.min_bars.max(MA_PERIOD + 1)
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
        let prev = &bars[n - 2];

        let mut diag = ReclaimDiagnostics {
            ma25: ctx.structure.averages.ma25,
            prev_ma25: sma_at(bars, n - 1, MA_PERIOD).or(ctx.structure.averages.ma25),
            rsi: ctx.input.snapshot.rsi,
            volume_ratio: None,
        };
        let fail = |reason: WaitReason, detail: String, diag: &ReclaimDiagnostics| {
            DetectorOutcome::not_ready(reason, detail)
                .with_diagnostics(SetupDiagnostics::Reclaim(diag.clone()))
        };

        let (Some(ma25), Some(prev_ma25)) = (diag.ma25, diag.prev_ma25) else {
            return fail(WaitReason::MissingIndicator, "MA25 unknown".into(), &diag);
        };
        if prev.close >= prev_ma25 {
            return fail(
                WaitReason::NoReclaim,
                format!("previous close {:.2} already above MA25 {prev_ma25:.2}", prev.close),
                &diag,
            );
        }
        let needed = ma25 * (1.0 + c.buffer_pct / 100.0);
        if cur.close < needed {
            return fail(
                WaitReason::NoReclaim,
                format!("close {:.2} below MA25 buffer {needed:.2}", cur.close),
                &diag,
            );
        }

        let Some(rsi) = diag.rsi else {
            return fail(WaitReason::MissingIndicator, "RSI unknown".into(), &diag);
        };
        if !(c.rsi_min..=c.rsi_max).contains(&rsi) {
            return fail(
                WaitReason::RsiOutOfBand,
                format!("RSI {rsi:.1} outside {:.0}..{:.0}", c.rsi_min, c.rsi_max),
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

        let stop = cur.low.min(prev.low) - c.stop_atr * atr;
        let target = (entry + c.target_atr * atr).max(ctx.structure.recent_high);
        DetectorOutcome::Triggered(SetupCandidate {
            kind: SetupKind::Reclaim,
            rationale: format!(
                "reclaim: close {:.2} back above MA25 {ma25:.2} with RSI {rsi:.0}",
                cur.close
            ),
            stop,
            target,
            nearest_resistance: ctx.resistances.first().copied(),
            diagnostics: SetupDiagnostics::Reclaim(diag),
        })
    }
}
