//! Exit milestone timeline.
//!
//! Four stages, keyed to R (the initial risk per share):
//! 1. +1R: stop to breakeven.
//! 2. +1.5R: lock a fraction of R.
//! 3. +2R: the remainder becomes a trailing runner.
//! 4. afterwards: trail by max(structural floor, MA25 − k·ATR).
//!
//! Stops ratchet: no stage lowers the stop set by the stage before it.

use serde::{Deserialize, Serialize};

use crate::config::ExitConfig;
use crate::domain::{round_to_tick, TickPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitStage {
    Breakeven,
    LockProfit,
    TrailRunner,
    Trail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitMilestone {
    pub stage: ExitStage,
    /// R multiple that activates the stage; `None` for the open-ended trail.
    pub trigger_r: Option<f64>,
    pub trigger_price: Option<f64>,
    pub stop: f64,
    pub note: String,
}

/// Trailing stop level: max(structural floor, MA25 − k·ATR).
pub fn trail_stop(config: &ExitConfig, floor: f64, ma25: Option<f64>, atr: f64) -> f64 {
    match ma25 {
        Some(ma) => floor.max(ma - config.trail_ma25_atr * atr),
        None => floor,
    }
}

/// Inputs for one plan's timeline.
#[derive(Debug, Clone, Copy)]
pub struct TimelineInputs {
    pub entry: f64,
    pub stop: f64,
    pub atr: f64,
    pub ma25: Option<f64>,
    /// Nearest structural support below entry (the initial stop when none).
    pub floor: f64,
    pub tick: f64,
}

/// Build the milestone timeline. Empty when the plan has no positive risk.
pub fn build_timeline(config: &ExitConfig, inp: &TimelineInputs) -> Vec<ExitMilestone> {
    let risk = inp.entry - inp.stop;
    if !(risk.is_finite() && risk > 0.0) {
        return Vec::new();
    }
    let at_r = |r: f64| round_to_tick(inp.entry + r * risk, inp.tick, TickPolicy::RoundUp);
    let stop_at = |s: f64| round_to_tick(s, inp.tick, TickPolicy::RoundDown);

    let breakeven = stop_at(inp.entry).max(inp.stop);
    let lock = stop_at(inp.entry + config.lock_fraction * risk).max(breakeven);
    let runner = stop_at(trail_stop(config, lock, inp.ma25, inp.atr)).max(lock);
    let trail = stop_at(trail_stop(config, inp.floor, inp.ma25, inp.atr)).max(runner);

    vec![
        ExitMilestone {
            stage: ExitStage::Breakeven,
            trigger_r: Some(config.breakeven_r),
            trigger_price: Some(at_r(config.breakeven_r)),
            stop: breakeven,
            note: format!("at +{}R move stop to entry", config.breakeven_r),
        },
        ExitMilestone {
            stage: ExitStage::LockProfit,
            trigger_r: Some(config.lock_r),
            trigger_price: Some(at_r(config.lock_r)),
            stop: lock,
            note: format!(
                "at +{}R lock {}R",
                config.lock_r, config.lock_fraction
            ),
        },
        ExitMilestone {
            stage: ExitStage::TrailRunner,
            trigger_r: Some(config.trail_r),
            trigger_price: Some(at_r(config.trail_r)),
            stop: runner,
            note: format!(
                "at +{}R trail runner at max(lock, MA25 - {} ATR)",
                config.trail_r, config.trail_ma25_atr
            ),
        },
        ExitMilestone {
            stage: ExitStage::Trail,
            trigger_r: None,
            trigger_price: None,
            stop: trail,
            note: format!(
                "then trail at max(structural floor, MA25 - {} ATR)",
                config.trail_ma25_atr
            ),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn config() -> ExitConfig {
        EngineConfig::balanced().exits
    }

    fn inputs() -> TimelineInputs {
        TimelineInputs {
            entry: 100.0,
            stop: 96.0,
            atr: 2.0,
            ma25: Some(99.0),
            floor: 97.0,
            tick: 0.01,
        }
    }

    #[test]
    fn milestones_follow_r_multiples() {
        let t = build_timeline(&config(), &inputs());
        assert_eq!(t.len(), 4);
        assert_eq!(t[0].stage, ExitStage::Breakeven);
        assert_eq!(t[0].trigger_price, Some(104.0));
        assert_eq!(t[0].stop, 100.0);
        assert_eq!(t[1].trigger_price, Some(106.0));
        assert_eq!(t[1].stop, 102.0);
        assert_eq!(t[2].trigger_price, Some(108.0));
        assert_eq!(t[3].trigger_r, None);
    }

    #[test]
    fn stops_never_move_down() {
        let t = build_timeline(&config(), &inputs());
        assert!(t.windows(2).all(|w| w[1].stop >= w[0].stop));
        // MA25 - 1 ATR = 97 sits below the lock, so the runner keeps the lock.
        assert_eq!(t[2].stop, 102.0);
        assert_eq!(t[3].stop, 102.0);
    }

    #[test]
    fn trail_uses_ma25_when_higher() {
        let mut inp = inputs();
        inp.ma25 = Some(106.0);
        let t = build_timeline(&config(), &inp);
        assert_eq!(t[2].stop, 104.0);
        assert_eq!(t[3].stop, 104.0);
    }

    #[test]
    fn trail_stop_without_ma25_is_floor() {
        assert_eq!(trail_stop(&config(), 97.0, None, 2.0), 97.0);
        assert_eq!(trail_stop(&config(), 97.0, Some(100.0), 2.0), 98.0);
    }

    #[test]
    fn no_risk_no_timeline() {
        let mut inp = inputs();
        inp.stop = 100.0;
        assert!(build_timeline(&config(), &inp).is_empty());
    }
}
