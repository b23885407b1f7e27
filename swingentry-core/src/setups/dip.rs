//! Dip-bounce: a controlled pullback into support that has started to turn.
//!
//! Nine checks, in order; the first failure decides the wait reason:
//! pullback depth, fib retracement, low recency, support, bounce pattern,
//! volume regime, recovery cap, higher low, RSI divergence.

use super::{
    DetectorOutcome, DipDiagnostics, SetupCandidate, SetupContext, SetupDetector,
    SetupDiagnostics, SetupKind, SupportKind, WaitReason,
};
use crate::config::DipConfig;
use crate::domain::input::RSI_PERIOD;
use crate::domain::PriceBar;
use crate::indicators::{average_volume, rsi_series};
use crate::levels::{highest_high, lowest_low, pivot_highs, pivot_low_touches, pivot_lows};
use crate::patterns::detect_bounce;
use crate::structure::Trend;

const FIB_LOW: f64 = 0.5;
const FIB_HIGH: f64 = 0.618;

#[derive(Debug, Clone)]
pub struct DipBounceDetector {
    config: DipConfig,
}

impl DipBounceDetector {
    pub fn new(config: DipConfig) -> Self {
        Self { config }
    }

    fn recovery_cap(&self, trend: Trend) -> f64 {
        match trend {
            Trend::StrongUp => self.config.recovery_cap_strong_up,
            Trend::Up => self.config.recovery_cap_up,
            Trend::WeakUp => self.config.recovery_cap_weak_up,
            Trend::Down => self.config.recovery_cap_down,
        }
    }

    fn find_support(
        &self,
        ctx: &SetupContext<'_>,
        low: f64,
        low_idx: usize,
    ) -> Option<SupportKind> {
        let c = &self.config;
        let band = c.ma_band_atr * ctx.atr;
        let averages = &ctx.structure.averages;
        let mas = [
            (SupportKind::Ma20, averages.ma20),
            (SupportKind::Ma25, averages.ma25),
            (SupportKind::Ma50, averages.ma50),
        ];
        if let Some((kind, _)) = mas
            .iter()
            .find(|(_, ma)| ma.is_some_and(|m| (low - m).abs() <= band))
        {
            return Some(*kind);
        }

        let bars = &ctx.input.bars;
        if pivot_low_touches(bars, low, low_idx, c.touch_tolerance_pct) >= c.min_pivot_touches {
            return Some(SupportKind::PivotTouches);
        }

        let recent = &bars[bars.len().saturating_sub(c.micro_cluster_bars)..];
        let clustered = recent
            .iter()
            .filter(|b| (b.low - low).abs() / low * 100.0 <= c.micro_cluster_pct)
            .count();
        (clustered >= c.micro_cluster_min).then_some(SupportKind::MicroCluster)
    }

    /// Higher price high on lower RSI against the previous pivot high.
    fn has_divergence(&self, bars: &[PriceBar], hi_idx: usize) -> bool {
        let earliest = hi_idx.saturating_sub(self.config.divergence_lookback);
        let Some(prior) = pivot_highs(&bars[..hi_idx], 2, 2)
            .into_iter()
            .filter(|&i| i >= earliest)
            .last()
        else {
            return false;
        };
        let rsi = rsi_series(bars, RSI_PERIOD);
        let (Some(now), Some(before)) = (rsi[hi_idx], rsi[prior]) else {
            return false;
        };
        bars[hi_idx].high > bars[prior].high && now < before
    }
}

impl SetupDetector for DipBounceDetector {
    fn kind(&self) -> SetupKind {
        SetupKind::DipBounce
    }

    fn min_bars(&self) -> usize {
        self.config.min_bars.max(self.config.pullback_window + 2)
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
        let mut diag = DipDiagnostics::default();
        let fail = |reason: WaitReason, detail: String, diag: &DipDiagnostics| {
            DetectorOutcome::not_ready(reason, detail)
                .with_diagnostics(SetupDiagnostics::DipBounce(diag.clone()))
        };

        // 1. Pullback depth.
        let Some((hi_idx, swing_high)) = highest_high(bars, n - 1 - c.pullback_window, n - 1)
        else {
            return fail(WaitReason::NoPullback, "no swing high".into(), &diag);
        };
        let Some((low_idx, pullback_low)) = lowest_low(bars, hi_idx, n) else {
            return fail(WaitReason::NoPullback, "no pullback low".into(), &diag);
        };
        let depth = swing_high - pullback_low;
        let depth_pct = depth / swing_high * 100.0;
        diag.swing_high = Some(swing_high);
        diag.pullback_low = Some(pullback_low);
        diag.depth_pct = Some(depth_pct);
        diag.depth_atr = Some(depth / atr);
        if depth <= 0.0 || (depth_pct < c.min_pullback_pct && depth < c.min_pullback_atr * atr) {
            return fail(
                WaitReason::NoPullback,
                format!("pullback {depth_pct:.1}% / {:.2} ATR too shallow", depth / atr),
                &diag,
            );
        }

        let bounce_atr = (cur.close - pullback_low) / atr;
        diag.bounce_atr = Some(bounce_atr);
        let vol_avg = average_volume(bars, n - 1, c.volume_window);
        let pullback_volume = (hi_idx + 1 < n - 1)
            .then(|| bars[hi_idx + 1..n - 1].iter().map(|b| b.volume).sum::<f64>())
            .map(|sum| sum / (n - 2 - hi_idx) as f64);
        diag.pullback_volume_ratio = vol_avg.zip(pullback_volume).map(|(avg, pv)| pv / avg);
        diag.bar_volume_ratio = vol_avg.map(|avg| cur.volume / avg);

        // 2. Retracement against the prior swing range.
        let prior_low = lowest_low(bars, hi_idx.saturating_sub(c.swing_lookback), hi_idx)
            .map(|(_, low)| low)
            .filter(|low| *low < swing_high);
        let Some(prior_low) = prior_low else {
            return fail(WaitReason::FibOutOfBand, "no prior swing low".into(), &diag);
        };
        let retracement = depth / (swing_high - prior_low);
        diag.retracement = Some(retracement);
        let in_band =
            (FIB_LOW - c.fib_tolerance..=FIB_HIGH + c.fib_tolerance).contains(&retracement);
        if !in_band {
            let strong = bounce_atr >= c.strong_bounce_atr;
            let very_dry = diag
                .pullback_volume_ratio
                .is_some_and(|r| r <= c.very_dry_ratio);
            if (strong || very_dry) && retracement <= c.max_override_retracement {
                diag.fib_override = true;
            } else {
                return fail(
                    WaitReason::FibOutOfBand,
                    format!("retracement {retracement:.2} outside band"),
                    &diag,
                );
            }
        }

        // 3. Low recency.
        let low_age = n - 1 - low_idx;
        diag.low_age = Some(low_age);
        if low_age > c.max_low_age {
            return fail(
                WaitReason::StaleLow,
                format!("low {low_age} bars ago (max {})", c.max_low_age),
                &diag,
            );
        }

        // 4. Support.
        let Some(support) = self.find_support(ctx, pullback_low, low_idx) else {
            return fail(
                WaitReason::NoSupport,
                format!("low {pullback_low:.2} not near MA, pivot, or cluster"),
                &diag,
            );
        };
        diag.support = Some(support);

        // 5. Bounce pattern and strength.
        let Some(pattern) = detect_bounce(prev, cur, atr) else {
            return fail(WaitReason::NoBouncePattern, "no bounce pattern".into(), &diag);
        };
        diag.pattern = Some(pattern);
        if bounce_atr < c.min_bounce_atr {
            return fail(
                WaitReason::WeakBounce,
                format!("bounce {bounce_atr:.2} ATR < {:.2}", c.min_bounce_atr),
                &diag,
            );
        }

        // 6. Volume regime.
        let dry = diag.pullback_volume_ratio.is_some_and(|r| r <= c.dry_ratio);
        let hot = diag.bar_volume_ratio.is_some_and(|r| r >= c.hot_ratio);
        if !(dry || hot) {
            return fail(
                WaitReason::VolumeRegime,
                format!(
                    "pullback volume {} / bar volume {}",
                    fmt_ratio(diag.pullback_volume_ratio),
                    fmt_ratio(diag.bar_volume_ratio)
                ),
                &diag,
            );
        }

        // 7. Recovery cap.
        let recovery = (cur.close - pullback_low) / depth;
        let cap = self.recovery_cap(ctx.structure.trend);
        diag.recovery = Some(recovery);
        diag.recovery_cap = Some(cap);
        let headroom_atr = ctx
            .resistances
            .first()
            .map(|r| (r - entry) / atr)
            .unwrap_or(f64::INFINITY);
        if recovery > cap
            && !(headroom_atr >= c.override_headroom_atr && bounce_atr >= c.strong_bounce_atr)
        {
            return fail(
                WaitReason::OverRecovered,
                format!("recovered {:.0}% of pullback (cap {:.0}%)", recovery * 100.0, cap * 100.0),
                &diag,
            );
        }

        // 8. Higher low.
        let reference_low = pivot_lows(&bars[..hi_idx], 2, 2)
            .last()
            .map(|&i| bars[i].low)
            .unwrap_or(prior_low);
        diag.reference_low = Some(reference_low);
        if pullback_low <= reference_low {
            return fail(
                WaitReason::NoHigherLow,
                format!("low {pullback_low:.2} <= prior low {reference_low:.2}"),
                &diag,
            );
        }

        // 9. Bearish divergence into nearby resistance.
        if c.divergence_check && self.has_divergence(bars, hi_idx) {
            diag.divergence = true;
            let reclaimed = cur.close > prev.high && bounce_atr >= c.strong_bounce_atr;
            if headroom_atr < c.divergence_headroom_atr && !reclaimed {
                return fail(
                    WaitReason::BearishDivergence,
                    format!("divergence with {headroom_atr:.2} ATR headroom"),
                    &diag,
                );
            }
        }

        let k = c.stop_atr * atr;
        let stop = match ctx.structure.averages.ma25 {
            Some(ma25) => (pullback_low - k).min(ma25 - k),
            None => pullback_low - k,
        };
        let mut target = (entry + c.target_atr * atr).max(ctx.structure.recent_high);
        if let (Some(&r1), Some(&r2)) = (ctx.resistances.first(), ctx.resistances.get(1)) {
            if r1 - entry < c.too_close_atr * atr && target <= r1 {
                target = r2;
            }
        }

        DetectorOutcome::Triggered(SetupCandidate {
            kind: SetupKind::DipBounce,
            rationale: format!(
                "dip-bounce: {depth_pct:.1}% pullback ({retracement:.2} retrace) at {support:?} support, {pattern}, bounce {bounce_atr:.2} ATR"
            ),
            stop,
            target,
            nearest_resistance: ctx.resistances.first().copied(),
            diagnostics: SetupDiagnostics::DipBounce(diag),
        })
    }
}

fn fmt_ratio(r: Option<f64>) -> String {
    r.map(|v| format!("{v:.2}x")).unwrap_or_else(|| "n/a".into())
}
