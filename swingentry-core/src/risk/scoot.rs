//! SCOOT: stepwise target lifting to farther clustered resistance.

use serde::{Deserialize, Serialize};

use super::supply::{wall_between, SupplyWall};
use crate::config::RiskConfig;

/// Why lifting stopped before the ratio was met.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScootBlock {
    NoLevels,
    CapReached { level: f64, cap: f64 },
    SupplyWall { low: f64, high: f64 },
    MaxHops { hops: usize },
}

impl std::fmt::Display for ScootBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScootBlock::NoLevels => write!(f, "no farther resistance"),
            ScootBlock::CapReached { level, cap } => {
                write!(f, "next level {level:.2} beyond cap {cap:.2}")
            }
            ScootBlock::SupplyWall { low, high } => {
                write!(f, "supply wall {low:.2}-{high:.2} in the way")
            }
            ScootBlock::MaxHops { hops } => write!(f, "hop limit {hops} reached"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScootOutcome {
    pub attempted: bool,
    pub hops: usize,
    pub from_target: f64,
    pub to_target: f64,
    pub block: Option<ScootBlock>,
}

/// Lift `target` hop by hop until `reward / risk >= required`.
///
/// `resistances` must be ascending. Each hop goes to the next level above the
/// current target, is capped at `entry + scoot_cap_atr * atr`, and is refused
/// when a supply wall lies between entry and the candidate level.
#[allow(clippy::too_many_arguments)]
pub fn scoot(
    config: &RiskConfig,
    entry: f64,
    risk: f64,
    target: f64,
    required: f64,
    atr: f64,
    resistances: &[f64],
    walls: &[SupplyWall],
) -> ScootOutcome {
    let mut out = ScootOutcome {
        attempted: false,
        hops: 0,
        from_target: target,
        to_target: target,
        block: None,
    };
    let meets = |t: f64| risk > 0.0 && (t - entry) / risk >= required;
    if !config.scoot_enabled || meets(target) {
        return out;
    }
    out.attempted = true;
    let cap = entry + config.scoot_cap_atr * atr;

    while !meets(out.to_target) {
        if out.hops >= config.scoot_max_hops {
            out.block = Some(ScootBlock::MaxHops { hops: out.hops });
            break;
        }
        let Some(&level) = resistances.iter().find(|l| **l > out.to_target) else {
            out.block = Some(ScootBlock::NoLevels);
            break;
        };
        if level > cap {
            out.block = Some(ScootBlock::CapReached { level, cap });
            break;
        }
        if let Some(wall) = wall_between(walls, entry, level) {
            out.block = Some(ScootBlock::SupplyWall {
                low: wall.low,
                high: wall.high,
            });
            break;
        }
        out.to_target = level;
        out.hops += 1;
    }
    out
}
