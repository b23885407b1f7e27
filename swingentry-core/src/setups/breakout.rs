//! Base breakout: a tight, repeatedly tested base cleared on expanding volume.

use super::{
    BreakoutDiagnostics, DetectorOutcome, SetupCandidate, SetupContext, SetupDetector,
    SetupDiagnostics, SetupKind, WaitReason,
};
use crate::config::BreakoutConfig;
use crate::indicators::average_volume;

#[derive(Debug, Clone)]
pub struct BreakoutDetector {
    config: BreakoutConfig,
}

impl BreakoutDetector {
    pub fn new(config: BreakoutConfig) -> Self {
        Self { config }
    }
}

impl SetupDetector for BreakoutDetector {
    fn kind(&self) -> SetupKind {
        SetupKind::Breakout
    }

    fn min_bars(&self) -> usize {
        self.config.min_bars.max(self.config.base_len + 2)
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
        let base = &bars[n - 1 - c.base_len..n - 1];

        let level = base.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
        let base_low = base.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
        let mut diag = BreakoutDiagnostics {
            level: Some(level),
            ..Default::default()
        };
        let fail = |reason: WaitReason, detail: String, diag: &BreakoutDiagnostics| {
            DetectorOutcome::not_ready(reason, detail)
                .with_diagnostics(SetupDiagnostics::Breakout(diag.clone()))
        };

        let tap_floor = level * (1.0 - c.tap_band_pct / 100.0);
        diag.taps = base.iter().filter(|b| b.high >= tap_floor).count();
        if diag.taps < c.min_taps {
            return fail(
                WaitReason::InsufficientTaps,
                format!("{} taps of {level:.2} (need {})", diag.taps, c.min_taps),
                &diag,
            );
        }

        let depth_pct = (level - base_low) / level * 100.0;
        diag.base_depth_pct = Some(depth_pct);
        if depth_pct > c.max_base_depth_pct {
            return fail(
                WaitReason::BaseTooLoose,
                format!("base depth {depth_pct:.1}% > {:.1}%", c.max_base_depth_pct),
                &diag,
            );
        }

        if cur.close < level * (1.0 + c.min_through_pct / 100.0) {
            return fail(
                WaitReason::NotThrough,
                format!("close {:.2} not through {level:.2}", cur.close),
                &diag,
            );
        }

        let gap_pct = (cur.open - prev.close) / prev.close * 100.0;
        diag.gap_pct = Some(gap_pct);
        if gap_pct > c.max_gap_pct {
            return fail(
                WaitReason::GapTooLarge,
                format!("gap {gap_pct:.1}% > {:.1}%", c.max_gap_pct),
                &diag,
            );
        }

        diag.volume_ratio = average_volume(bars, n - 1, c.base_len).map(|avg| cur.volume / avg);
        if !diag.volume_ratio.is_some_and(|r| r >= c.volume_expansion) {
            return fail(
                WaitReason::NoVolumeExpansion,
                format!("volume {:?} < {:.1}x base", diag.volume_ratio, c.volume_expansion),
                &diag,
            );
        }

        diag.rsi = ctx.input.snapshot.rsi;
        if let Some(rsi) = diag.rsi.filter(|r| *r > c.rsi_ceiling) {
            return fail(
                WaitReason::RsiTooHot,
                format!("RSI {rsi:.1} > {:.0}", c.rsi_ceiling),
                &diag,
            );
        }

        let stop = level - c.stop_atr * atr;
        let target = entry + (level - base_low).max(c.target_atr * atr);
        DetectorOutcome::Triggered(SetupCandidate {
            kind: SetupKind::Breakout,
            rationale: format!(
                "breakout: close {:.2} through {level:.2} ({} taps, {depth_pct:.1}% base) on {:.1}x volume",
                cur.close,
                diag.taps,
                diag.volume_ratio.unwrap_or(f64::NAN)
            ),
            stop,
            target,
            nearest_resistance: ctx.resistances.first().copied(),
            diagnostics: SetupDiagnostics::Breakout(diag),
        })
    }
}
