//! Market-wide guards: index impulse days and the liquidity prefilter.

use serde::{Deserialize, Serialize};

use super::{Guard, GuardContext, GuardVerdict};
use crate::config::GuardConfig;
use crate::telemetry::{BlockCode, GuardSamples};

/// Today's move of a broad index proxy, supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketContext {
    /// Signed percent change of the index today.
    pub index_change_pct: f64,
    /// Index ATR as a percent of its level, when known.
    #[serde(default)]
    pub index_atr_pct: Option<f64>,
}

/// Skip entries on days the index moved beyond a percent or ATR threshold.
#[derive(Debug, Clone)]
pub struct MarketImpulseGuard {
    max_pct: f64,
    max_atr: f64,
}

impl MarketImpulseGuard {
    pub fn new(config: &GuardConfig) -> Self {
        Self {
            max_pct: config.max_index_move_pct,
            max_atr: config.max_index_move_atr,
        }
    }
}

impl Guard for MarketImpulseGuard {
    fn name(&self) -> &'static str {
        "market_impulse"
    }

    fn evaluate(&self, ctx: &GuardContext<'_>, _samples: &mut GuardSamples) -> GuardVerdict {
        let Some(market) = ctx.market else {
            return GuardVerdict::pass("no market context");
        };
        if !market.index_change_pct.is_finite() {
            return GuardVerdict::pass("index change unknown");
        }
        let magnitude = market.index_change_pct.abs();
        let atr_units = market
            .index_atr_pct
            .filter(|a| a.is_finite() && *a > 0.0)
            .map(|a| magnitude / a);

        let verdict = if magnitude >= self.max_pct
            || atr_units.is_some_and(|u| u >= self.max_atr)
        {
            GuardVerdict::veto(
                BlockCode::MarketImpulse,
                format!(
                    "index moved {:+.2}% today, limit {:.2}% / {:.1} ATR",
                    market.index_change_pct, self.max_pct, self.max_atr
                ),
            )
        } else {
            GuardVerdict::pass(format!("index moved {:+.2}%", market.index_change_pct))
        };
        let verdict = verdict.with_detail("index_change_pct", market.index_change_pct);
        match atr_units {
            Some(u) => verdict.with_detail("index_move_atr", u),
            None => verdict,
        }
    }
}

/// Liquidity prefilter over dollar volume, share volume, price and ATR ticks.
///
/// A metric below `hard_fraction` of its threshold vetoes; between that and
/// the threshold it only raises a near-threshold warning.
#[derive(Debug, Clone)]
pub struct LiquidityGuard {
    window: usize,
    min_dollar_volume: f64,
    min_avg_volume: f64,
    min_price: f64,
    min_atr_ticks: f64,
    hard_fraction: f64,
}

impl LiquidityGuard {
    pub fn new(config: &GuardConfig) -> Self {
        Self {
            window: config.liquidity_window,
            min_dollar_volume: config.min_dollar_volume,
            min_avg_volume: config.min_avg_volume,
            min_price: config.min_price,
            min_atr_ticks: config.min_atr_ticks,
            hard_fraction: config.hard_fraction,
        }
    }
}

impl Guard for LiquidityGuard {
    fn name(&self) -> &'static str {
        "liquidity"
    }

    fn evaluate(&self, ctx: &GuardContext<'_>, _samples: &mut GuardSamples) -> GuardVerdict {
        let bars = &ctx.input.bars;
        let recent = &bars[bars.len().saturating_sub(self.window.max(1))..];
        let n = recent.len().max(1) as f64;
        let avg_volume = recent.iter().map(|b| b.volume).sum::<f64>() / n;
        let dollar_volume = recent.iter().map(|b| b.close * b.volume).sum::<f64>() / n;
        let atr_ticks = if ctx.tick > 0.0 {
            ctx.atr / ctx.tick
        } else {
            f64::INFINITY
        };

        let metrics = [
            ("dollar_volume", dollar_volume, self.min_dollar_volume),
            ("avg_volume", avg_volume, self.min_avg_volume),
            ("price", ctx.entry, self.min_price),
            ("atr_ticks", atr_ticks, self.min_atr_ticks),
        ];

        let mut hard: Option<String> = None;
        let mut near = Vec::new();
        for (name, value, threshold) in metrics {
            if threshold <= 0.0 {
                continue;
            }
            let floor = self.hard_fraction * threshold;
            if value < floor {
                hard.get_or_insert_with(|| {
                    format!("illiquid: {name} {value:.2} below hard floor {floor:.2}")
                });
            } else if value < threshold {
                near.push(format!(
                    "near-threshold liquidity: {name} {value:.2} below {threshold:.2}"
                ));
            }
        }

        let verdict = match hard {
            Some(reason) => GuardVerdict::veto(BlockCode::Illiquid, reason),
            None if near.is_empty() => GuardVerdict::pass("liquid"),
            None => GuardVerdict::pass("liquid with warnings").with_warning(near.join("; ")),
        };
        metrics
            .into_iter()
            .filter(|(_, v, _)| v.is_finite())
            .fold(verdict, |v, (name, value, _)| v.with_detail(name, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::guards::fixtures::Case;
    use crate::setups::fixtures::flat;

    fn config() -> GuardConfig {
        EngineConfig::balanced().guards
    }

    fn with_market(change: f64, atr_pct: Option<f64>) -> Case {
        let mut case = Case::calm();
        case.market = Some(MarketContext {
            index_change_pct: change,
            index_atr_pct: atr_pct,
        });
        case
    }

    fn impulse(case: &Case) -> GuardVerdict {
        MarketImpulseGuard::new(&config()).evaluate(&case.ctx(), &mut GuardSamples::new())
    }

    #[test]
    fn impulse_by_percent_or_atr() {
        assert!(impulse(&with_market(-2.3, None)).veto);
        assert!(impulse(&with_market(1.2, Some(0.7))).veto);
        assert!(!impulse(&with_market(0.8, Some(1.0))).veto);
    }

    #[test]
    fn no_market_context_passes() {
        let v = impulse(&Case::calm());
        assert!(!v.veto);
        assert_eq!(v.reason, "no market context");
    }

    fn liquidity(case: &Case) -> GuardVerdict {
        LiquidityGuard::new(&config()).evaluate(&case.ctx(), &mut GuardSamples::new())
    }

    #[test]
    fn liquid_name_passes_clean() {
        let v = liquidity(&Case::calm());
        assert!(!v.veto);
        assert!(v.warning.is_none());
        assert_eq!(v.details["avg_volume"], 1_000_000.0);
    }

    #[test]
    fn near_threshold_only_warns() {
        let mut case = Case::calm();
        case.input.bars = flat(30, 100.0, 40_000.0);
        let v = liquidity(&case);
        assert!(!v.veto);
        let warning = v.warning.unwrap();
        assert!(warning.contains("avg_volume"));
    }

    #[test]
    fn far_below_threshold_vetoes() {
        let mut case = Case::calm();
        case.input.bars = flat(30, 100.0, 4_000.0);
        let v = liquidity(&case);
        assert!(v.veto);
        assert_eq!(v.code, Some(BlockCode::Illiquid));
        assert!(v.reason.contains("dollar_volume"));
    }

    #[test]
    fn coarse_tick_vetoes() {
        let mut case = Case::calm();
        case.tick = 1.0;
        let v = liquidity(&case);
        assert!(v.veto);
        assert!(v.reason.contains("atr_ticks"));
    }
}
