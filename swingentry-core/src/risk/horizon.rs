//! Holding-horizon cap: a target may not imply a larger move than the
//! instrument can plausibly make within the holding window.

use crate::config::{HorizonPolicy, RiskConfig};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HorizonOutcome {
    Within,
    /// Target clamped to the horizon; stop possibly tightened.
    Clamped { target: f64, stop: f64 },
    Rejected { max_move: f64 },
}

/// Largest move the horizon allows: bars × ATR-per-bar × ATR.
pub fn max_move(config: &RiskConfig, atr: f64) -> f64 {
    config.horizon_bars as f64 * config.atr_per_bar * atr
}

/// Apply the horizon cap.
///
/// Under `Clamp`, when the clamped ratio falls short of `required`, the stop
/// is raised toward `entry - reward / required` but never to within
/// `min_stop_distance` of entry and never below the original stop.
pub fn apply_horizon(
    config: &RiskConfig,
    entry: f64,
    stop: f64,
    target: f64,
    required: f64,
    atr: f64,
    min_stop_distance: f64,
) -> HorizonOutcome {
    let limit = max_move(config, atr);
    if target - entry <= limit {
        return HorizonOutcome::Within;
    }
    match config.horizon_policy {
        HorizonPolicy::Reject => HorizonOutcome::Rejected { max_move: limit },
        HorizonPolicy::Clamp => {
            let target = entry + limit;
            let risk = entry - stop;
            let stop = if risk > 0.0 && limit / risk < required {
                let desired = entry - limit / required;
                desired.min(entry - min_stop_distance).max(stop)
            } else {
                stop
            };
            HorizonOutcome::Clamped { target, stop }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn config(policy: HorizonPolicy) -> RiskConfig {
        let mut c = EngineConfig::balanced().risk;
        c.horizon_policy = policy;
        c
    }

    #[test]
    fn target_inside_horizon_is_untouched() {
        // max move = 10 * 0.45 * 2 = 9
        let out = apply_horizon(&config(HorizonPolicy::Clamp), 100.0, 96.0, 108.0, 1.5, 2.0, 2.0);
        assert_eq!(out, HorizonOutcome::Within);
    }

    #[test]
    fn clamp_tightens_stop_within_minimum_distance() {
        let out = apply_horizon(&config(HorizonPolicy::Clamp), 100.0, 92.0, 115.0, 1.5, 2.0, 2.0);
        let HorizonOutcome::Clamped { target, stop } = out else {
            panic!("expected clamp, got {out:?}");
        };
        assert!((target - 109.0).abs() < 1e-9);
        // desired 100 - 9 / 1.5 = 94
        assert!((stop - 94.0).abs() < 1e-9);
    }

    #[test]
    fn clamp_respects_minimum_stop_distance() {
        let out = apply_horizon(&config(HorizonPolicy::Clamp), 100.0, 92.0, 115.0, 1.5, 2.0, 7.0);
        let HorizonOutcome::Clamped { stop, .. } = out else {
            panic!("expected clamp");
        };
        assert!((stop - 93.0).abs() < 1e-9);
    }

    #[test]
    fn reject_policy() {
        let out = apply_horizon(&config(HorizonPolicy::Reject), 100.0, 92.0, 115.0, 1.5, 2.0, 2.0);
        assert!(matches!(out, HorizonOutcome::Rejected { .. }));
    }
}
