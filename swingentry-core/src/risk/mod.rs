//! Risk/reward engine.
//!
//! Turns a detector's raw stop and target into a tradeable plan:
//! 1. minimum stop distance by regime (dip-style stops are trusted unless
//!    pathological),
//! 2. target lift past resistance that is too close,
//! 3. ratio vs. the required ratio for the regime and volatility,
//! 4. SCOOT toward farther resistance when short,
//! 5. holding-horizon cap,
//! 6. accept, accept on probation, or reject.

pub mod horizon;
pub mod scoot;
pub mod supply;

pub use horizon::{apply_horizon, max_move, HorizonOutcome};
pub use scoot::{scoot, ScootBlock, ScootOutcome};
pub use supply::{detect_walls, wall_between, SupplyWall, WallKind};

use serde::{Deserialize, Serialize};

use crate::config::RiskConfig;
use crate::setups::SetupKind;
use crate::structure::Trend;

/// Score from an external model, consumed only as a bounded bias.
///
/// `score` is in [0, 1] with 0.5 neutral; `confidence` in [0, 1] scales the
/// effect. Out-of-range values are clamped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExternalScore {
    pub score: f64,
    pub confidence: f64,
}

impl ExternalScore {
    /// Shift applied to the required ratio, within ±`weight`.
    ///
    /// A bullish score lowers the requirement; a bearish one raises it.
    pub fn rr_shift(&self, weight: f64) -> f64 {
        if !(self.score.is_finite() && self.confidence.is_finite()) {
            return 0.0;
        }
        let direction = (self.score.clamp(0.0, 1.0) - 0.5) * 2.0;
        -(weight * direction * self.confidence.clamp(0.0, 1.0))
    }
}

/// Why the RR engine refused a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RrRejection {
    InvalidGeometry { stop: f64, entry: f64, target: f64 },
    BelowRequired { ratio: f64, required: f64 },
    HorizonExceeded { reward: f64, max_move: f64 },
}

impl std::fmt::Display for RrRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RrRejection::InvalidGeometry {
                stop,
                entry,
                target,
            } => write!(
                f,
                "invalid geometry: stop {stop:.2} / entry {entry:.2} / target {target:.2}"
            ),
            RrRejection::BelowRequired { ratio, required } => {
                write!(f, "RR {ratio:.2} below required {required:.2}")
            }
            RrRejection::HorizonExceeded { reward, max_move } => {
                write!(f, "target move {reward:.2} exceeds horizon {max_move:.2}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRewardResult {
    pub acceptable: bool,
    pub ratio: f64,
    pub required: f64,
    pub stop: f64,
    pub target: f64,
    pub risk: f64,
    pub reward: f64,
    pub atr: f64,
    pub probation: bool,
    pub horizon_clamped: bool,
    pub scoot: ScootOutcome,
    pub rejection: Option<RrRejection>,
}

impl RiskRewardResult {
    /// How far the ratio falls short of the requirement (0 when met).
    pub fn shortfall(&self) -> f64 {
        (self.required - self.ratio).max(0.0)
    }
}

/// Everything the RR engine reads for one candidate.
#[derive(Debug, Clone, Copy)]
pub struct RiskInputs<'a> {
    pub kind: SetupKind,
    pub entry: f64,
    pub stop: f64,
    pub target: f64,
    pub atr: f64,
    pub trend: Trend,
    pub rsi: Option<f64>,
    /// Clustered resistance above entry, nearest first.
    pub resistances: &'a [f64],
    pub walls: &'a [SupplyWall],
    pub external: Option<ExternalScore>,
}

/// Minimum stop distance in ATR for the regime.
pub fn min_stop_atr(config: &RiskConfig, trend: Trend) -> f64 {
    match trend {
        Trend::StrongUp => config.min_stop_atr_strong_up,
        Trend::Up => config.min_stop_atr_up,
        Trend::WeakUp => config.min_stop_atr_weak_up,
        Trend::Down => config.min_stop_atr_down,
    }
}

/// Required ratio for the regime, volatility, setup style, and external score.
pub fn required_ratio(
    config: &RiskConfig,
    trend: Trend,
    atr_pct: f64,
    dip_style: bool,
    external: Option<ExternalScore>,
) -> f64 {
    let mut required = config.base_rr;
    match trend {
        Trend::StrongUp => required += config.strong_up_rr_bump,
        Trend::WeakUp => required += config.weak_up_rr_bump,
        Trend::Up | Trend::Down => {}
    }
    if atr_pct < config.low_vol_atr_pct {
        required += config.low_vol_rr_bump;
    } else if atr_pct > config.high_vol_atr_pct {
        required += config.high_vol_rr_bump;
    }
    if dip_style {
        required = required.max(config.dip_min_rr);
    }
    if let Some(ext) = external {
        required += ext.rr_shift(config.external_score_weight);
    }
    required
}

/// Run the six RR steps for one candidate.
pub fn evaluate(config: &RiskConfig, inp: &RiskInputs<'_>) -> RiskRewardResult {
    let entry = inp.entry;
    let atr = inp.atr;
    let dip_style = inp.kind.is_dip_style();
    let min_distance = min_stop_atr(config, inp.trend) * atr;

    // 1. Stop distance.
    let pathological = !inp.stop.is_finite() || inp.stop >= entry;
    let stop = if dip_style {
        if pathological {
            entry - config.dip_fallback_stop_atr * atr
        } else {
            inp.stop
        }
    } else if pathological {
        entry - min_distance
    } else {
        inp.stop.min(entry - min_distance)
    };

    // 2. Target lift.
    let mut target = inp.target;
    if let (Some(&r1), Some(&r2)) = (inp.resistances.first(), inp.resistances.get(1)) {
        if r1 - entry < config.hop_threshold_atr * atr && target <= r2 {
            target = target.max(r2);
        }
    }
    if dip_style {
        let extension = (config.dip_min_target_atr * atr).max(config.dip_min_target_pct / 100.0 * entry);
        target = target.max(entry + extension);
    }

    // 3. Ratio.
    let required = required_ratio(config, inp.trend, atr / entry * 100.0, dip_style, inp.external);
    let mut result = RiskRewardResult {
        acceptable: false,
        ratio: 0.0,
        required,
        stop,
        target,
        risk: entry - stop,
        reward: target - entry,
        atr,
        probation: false,
        horizon_clamped: false,
        scoot: ScootOutcome {
            from_target: target,
            to_target: target,
            ..Default::default()
        },
        rejection: None,
    };
    let geometry_ok = [stop, target, entry].iter().all(|v| v.is_finite())
        && stop > 0.0
        && stop < entry
        && entry < target;
    if !geometry_ok {
        result.rejection = Some(RrRejection::InvalidGeometry {
            stop,
            entry,
            target,
        });
        return result;
    }
    result.ratio = result.reward / result.risk;

    // 4. SCOOT.
    result.scoot = scoot(
        config,
        entry,
        result.risk,
        target,
        required,
        atr,
        inp.resistances,
        inp.walls,
    );
    result.target = result.scoot.to_target;

    // 5. Horizon.
    match apply_horizon(config, entry, result.stop, result.target, required, atr, min_distance) {
        HorizonOutcome::Within => {}
        HorizonOutcome::Clamped { target, stop } => {
            result.target = target;
            result.stop = stop;
            result.horizon_clamped = true;
        }
        HorizonOutcome::Rejected { max_move } => {
            result.reward = result.target - entry;
            result.ratio = result.reward / result.risk;
            result.rejection = Some(RrRejection::HorizonExceeded {
                reward: result.reward,
                max_move,
            });
            return result;
        }
    }
    result.risk = entry - result.stop;
    result.reward = result.target - entry;
    result.ratio = result.reward / result.risk;

    // 6. Accept, probation, or reject.
    if result.ratio >= required {
        result.acceptable = true;
    } else if result.ratio >= required - config.probation_slack
        && inp.trend.is_up()
        && inp.rsi.is_some_and(|r| r < config.probation_rsi_max)
    {
        result.acceptable = true;
        result.probation = true;
    } else {
        result.rejection = Some(RrRejection::BelowRequired {
            ratio: result.ratio,
            required,
        });
    }
    result
}
