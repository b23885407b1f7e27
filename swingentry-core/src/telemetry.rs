//! Structured decision telemetry.
//!
//! Blocks are always recorded; gate records and candidate traces depend on
//! the debug level. Guard samples are per-call accumulators (never global):
//! a batch driver that wants running histograms passes one in by `&mut` or
//! merges per-instrument accumulators afterwards.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::guards::GuardVerdict;
use crate::risk::{ExternalScore, RiskRewardResult, RrRejection};
use crate::setups::{DetectorOutcome, SetupKind, WaitReason};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebugLevel {
    /// Blocks and distributions only.
    #[default]
    Off,
    /// Plus one record per gate passed or failed.
    Gates,
    /// Plus full candidate traces.
    Full,
}

impl std::str::FromStr for DebugLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "none" | "0" => Ok(DebugLevel::Off),
            "gates" | "1" => Ok(DebugLevel::Gates),
            "full" | "2" => Ok(DebugLevel::Full),
            other => Err(format!("unknown debug level '{other}'")),
        }
    }
}

/// Stable classification of every reason a candidate or decision is blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockCode {
    InvalidInput,
    NotReady,
    RrInvalid,
    RrBelowRequired,
    HorizonExceeded,
    RsiCeiling,
    InsufficientHeadroom,
    Ma25Extension,
    UpStreak,
    SupplyWall,
    WeeklyTop,
    FallingKnife,
    MarketImpulse,
    Illiquid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateRecord {
    pub stage: String,
    pub kind: Option<SetupKind>,
    pub passed: bool,
    pub detail: String,
}

/// One rejection. `gate` names the stage that refused (`input`, `detector`,
/// `rr`, or `guard:<name>`); the typed fields carry the same facts as
/// `reason` so callers never need to parse it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub gate: String,
    pub kind: Option<SetupKind>,
    pub code: BlockCode,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_reason: Option<WaitReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rr_rejection: Option<RrRejection>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, f64>,
}

impl Block {
    pub fn new(
        gate: impl Into<String>,
        kind: Option<SetupKind>,
        code: BlockCode,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            gate: gate.into(),
            kind,
            code,
            reason: reason.into(),
            wait_reason: None,
            rr_rejection: None,
            details: BTreeMap::new(),
        }
    }

    pub fn with_wait_reason(mut self, reason: WaitReason) -> Self {
        self.wait_reason = Some(reason);
        self
    }

    pub fn with_rr_rejection(mut self, rejection: RrRejection) -> Self {
        self.rr_rejection = Some(rejection);
        self
    }

    pub fn with_details(mut self, details: BTreeMap<String, f64>) -> Self {
        self.details = details;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardTrace {
    pub guard: String,
    pub verdict: GuardVerdict,
}

/// Everything that happened to one detector's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateTrace {
    pub kind: SetupKind,
    pub outcome: DetectorOutcome,
    pub rr: Option<RiskRewardResult>,
    pub guards: Vec<GuardTrace>,
}

// ─── Histograms ──────────────────────────────────────────────────────

/// Per-call histogram accumulator for guard and RR measurements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuardSamples {
    pub headroom_atr: Vec<f64>,
    pub headroom_pct: Vec<f64>,
    pub rr_shortfall: Vec<f64>,
    pub ma25_distance_atr: Vec<f64>,
}

fn push_finite(series: &mut Vec<f64>, value: f64) {
    if value.is_finite() {
        series.push(value);
    }
}

impl GuardSamples {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_headroom(&mut self, atr_units: f64, pct: f64) {
        push_finite(&mut self.headroom_atr, atr_units);
        push_finite(&mut self.headroom_pct, pct);
    }

    pub fn record_rr_shortfall(&mut self, shortfall: f64) {
        push_finite(&mut self.rr_shortfall, shortfall);
    }

    pub fn record_ma25_distance(&mut self, atr_units: f64) {
        push_finite(&mut self.ma25_distance_atr, atr_units);
    }

    pub fn is_empty(&self) -> bool {
        self.headroom_atr.is_empty()
            && self.headroom_pct.is_empty()
            && self.rr_shortfall.is_empty()
            && self.ma25_distance_atr.is_empty()
    }

    /// Append another accumulator's samples.
    pub fn merge(&mut self, other: &GuardSamples) {
        self.headroom_atr.extend_from_slice(&other.headroom_atr);
        self.headroom_pct.extend_from_slice(&other.headroom_pct);
        self.rr_shortfall.extend_from_slice(&other.rr_shortfall);
        self.ma25_distance_atr
            .extend_from_slice(&other.ma25_distance_atr);
    }

    /// Summary per non-empty histogram, keyed by histogram name.
    pub fn distributions(&self) -> BTreeMap<String, Distribution> {
        [
            ("headroom_atr", &self.headroom_atr),
            ("headroom_pct", &self.headroom_pct),
            ("rr_shortfall", &self.rr_shortfall),
            ("ma25_distance_atr", &self.ma25_distance_atr),
        ]
        .into_iter()
        .filter_map(|(name, series)| Distribution::of(series).map(|d| (name.to_string(), d)))
        .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
}

impl Distribution {
    /// `None` for an empty series.
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let n = sorted.len();
        let median = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        };
        Some(Self {
            count: n,
            min: sorted[0],
            max: sorted[n - 1],
            mean: sorted.iter().sum::<f64>() / n as f64,
            median,
        })
    }
}

// ─── Telemetry ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Telemetry {
    pub config_fingerprint: String,
    pub debug_level: DebugLevel,
    pub gates: Vec<GateRecord>,
    pub blocks: Vec<Block>,
    pub histograms: GuardSamples,
    pub distributions: BTreeMap<String, Distribution>,
    pub warnings: Vec<String>,
    pub external_score: Option<ExternalScore>,
    pub candidates: Vec<CandidateTrace>,
}

impl Telemetry {
    pub fn new(config_fingerprint: String, debug_level: DebugLevel) -> Self {
        Self {
            config_fingerprint,
            debug_level,
            ..Default::default()
        }
    }

    pub fn gate(
        &mut self,
        stage: impl Into<String>,
        kind: Option<SetupKind>,
        passed: bool,
        detail: impl Into<String>,
    ) {
        if self.debug_level >= DebugLevel::Gates {
            self.gates.push(GateRecord {
                stage: stage.into(),
                kind,
                passed,
                detail: detail.into(),
            });
        }
    }

    pub fn block(&mut self, block: Block) {
        self.blocks.push(block);
    }

    pub fn trace(&mut self, trace: CandidateTrace) {
        if self.debug_level >= DebugLevel::Full {
            self.candidates.push(trace);
        }
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }

    /// Snapshot the call's samples into histograms and distributions.
    pub fn finish(&mut self, samples: &GuardSamples) {
        self.distributions = samples.distributions();
        self.histograms = samples.clone();
    }
}
