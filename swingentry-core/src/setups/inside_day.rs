//! Inside-day continuation in an established uptrend.

use super::{
    DetectorOutcome, InsideDayDiagnostics, SetupCandidate, SetupContext, SetupDetector,
    SetupDiagnostics, SetupKind, WaitReason,
};
use crate::config::InsideDayConfig;

#[derive(Debug, Clone)]
pub struct InsideDayDetector {
    config: InsideDayConfig,
}

impl InsideDayDetector {
    pub fn new(config: InsideDayConfig) -> Self {
        Self { config }
    }
}

impl SetupDetector for InsideDayDetector {
    fn kind(&self) -> SetupKind {
        SetupKind::InsideDay
    }

    fn min_bars(&self) -> usize {
        self.config.min_bars.max(2)
    }

    fn detect(&self, ctx: &SetupContext<'_>) -> DetectorOutcome {
        let c = &self.config;
        let bars = &ctx.input.bars;
        let n = bars.len();
        if n < self.min_bars() {
            return DetectorOutcome::insufficient(n, self.min_bars());
        }
        let cur = &bars[n - 1];
        let mother = &bars[n - 2];
        let diag = InsideDayDiagnostics {
            mother_high: Some(mother.high),
            mother_low: Some(mother.low),
            close_location: cur.close_location(),
        };
        let fail = |reason: WaitReason, detail: String| {
            DetectorOutcome::not_ready(reason, detail)
                .with_diagnostics(SetupDiagnostics::InsideDay(diag.clone()))
        };

        if cur.high > mother.high || cur.low < mother.low {
            return fail(
                WaitReason::NotInsideBar,
                format!(
                    "range {:.2}-{:.2} outside {:.2}-{:.2}",
                    cur.low, cur.high, mother.low, mother.high
                ),
            );
        }
        let min_location = 1.0 - c.upper_fraction;
        if !diag.close_location.is_some_and(|loc| loc >= min_location) {
            return fail(
                WaitReason::WeakClose,
                format!("close not in top {:.0}% of range", c.upper_fraction * 100.0),
            );
        }
        if !ctx.structure.trend.is_up() {
            return fail(
                WaitReason::TrendNotUp,
                format!("trend {}", ctx.structure.trend),
            );
        }

        let atr = ctx.atr;
        let stop = mother.low - c.stop_atr * atr;
        let target = (ctx.entry() + c.target_atr * atr).max(ctx.structure.recent_high);
        DetectorOutcome::Triggered(SetupCandidate {
            kind: SetupKind::InsideDay,
            rationale: format!(
                "inside day within {:.2}-{:.2}, strong close in {} trend",
                mother.low, mother.high, ctx.structure.trend
            ),
            stop,
            target,
            nearest_resistance: ctx.resistances.first().copied(),
            diagnostics: SetupDiagnostics::InsideDay(diag),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::domain::{PriceBar, RawSnapshot};
    use crate::setups::fixtures::{bar, input, run};

    fn trending(last: PriceBar) -> Vec<PriceBar> {
        let mut bars: Vec<PriceBar> = (0..29)
            .map(|i| {
                let close = 80.0 + i as f64;
                bar(i, close - 0.5, close + 0.5, close - 1.0, close, 1_000_000.0)
            })
            .collect();
        // mother bar
        bars[28] = bar(28, 106.0, 110.0, 105.0, 108.0, 1_000_000.0);
        bars.push(last);
        bars
    }

    fn snap(price: f64) -> RawSnapshot {
        RawSnapshot {
            price: Some(price),
            atr14: Some(2.0),
            ma25: Some(100.0),
            ma50: Some(95.0),
            ..Default::default()
        }
    }

    fn detector() -> InsideDayDetector {
        InsideDayDetector::new(EngineConfig::balanced().inside_day)
    }

    #[test]
    fn triggers_inside_strong_close() {
        let last = bar(29, 107.0, 109.0, 106.0, 108.8, 900_000.0);
        let outcome = run(&detector(), &input(snap(108.8), trending(last)));
        let DetectorOutcome::Triggered(cand) = outcome else {
            panic!("expected trigger, got {outcome:?}");
        };
        assert!((cand.stop - 104.5).abs() < 1e-9);
        assert!((cand.target - 112.8).abs() < 1e-9);
    }

    #[test]
    fn outside_range_is_not_inside() {
        let last = bar(29, 107.0, 110.5, 106.0, 110.2, 900_000.0);
        let outcome = run(&detector(), &input(snap(110.2), trending(last)));
        assert_eq!(outcome.wait_reason(), Some(WaitReason::NotInsideBar));
    }

    #[test]
    fn weak_close_inside() {
        let last = bar(29, 108.0, 109.0, 106.0, 106.5, 900_000.0);
        let outcome = run(&detector(), &input(snap(106.5), trending(last)));
        assert_eq!(outcome.wait_reason(), Some(WaitReason::WeakClose));
    }

    #[test]
    fn requires_uptrend() {
        let last = bar(29, 107.0, 109.0, 106.0, 108.8, 900_000.0);
        let mut raw = snap(108.8);
        raw.ma25 = Some(112.0);
        raw.ma50 = Some(115.0);
        let outcome = run(&detector(), &input(raw, trending(last)));
        assert_eq!(outcome.wait_reason(), Some(WaitReason::TrendNotUp));
    }
}
