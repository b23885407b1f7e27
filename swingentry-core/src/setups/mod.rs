//! Setup detectors: one strategy per entry pattern.
//!
//! Detectors are stateless: they read the validated input and market
//! structure and either produce a candidate (raw stop and target, before the
//! RR engine) or say why the pattern is not ready. A detector never panics
//! and never errors; insufficient history is a `NotReady` outcome.

pub mod breakout;
pub mod dip;
pub mod inside_day;
pub mod reclaim;
pub mod retest;

pub use breakout::BreakoutDetector;
pub use dip::DipBounceDetector;
pub use inside_day::InsideDayDetector;
pub use reclaim::ReclaimDetector;
pub use retest::RetestDetector;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::domain::MarketInput;
use crate::patterns::BouncePattern;
use crate::structure::MarketStructure;

// ─── Kinds ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SetupKind {
    DipBounce,
    Retest,
    Reclaim,
    InsideDay,
    Breakout,
}

impl SetupKind {
    /// All kinds in evaluation and priority order.
    pub const ALL: [SetupKind; 5] = [
        SetupKind::DipBounce,
        SetupKind::Retest,
        SetupKind::Reclaim,
        SetupKind::InsideDay,
        SetupKind::Breakout,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SetupKind::DipBounce => "DIP_BOUNCE",
            SetupKind::Retest => "RETEST",
            SetupKind::Reclaim => "RECLAIM",
            SetupKind::InsideDay => "INSIDE_DAY",
            SetupKind::Breakout => "BREAKOUT",
        }
    }

    /// Position in the priority order (0 = highest).
    pub fn priority(self) -> usize {
        SetupKind::ALL
            .iter()
            .position(|k| *k == self)
            .unwrap_or(SetupKind::ALL.len())
    }

    /// Kinds whose detector stop is structural and trusted by the RR engine.
    pub fn is_dip_style(self) -> bool {
        matches!(self, SetupKind::DipBounce | SetupKind::Retest)
    }
}

impl std::fmt::Display for SetupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for SetupKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        match norm.as_str() {
            "DIP_BOUNCE" | "DIP" => Ok(SetupKind::DipBounce),
            "RETEST" => Ok(SetupKind::Retest),
            "RECLAIM" | "MA25_RECLAIM" => Ok(SetupKind::Reclaim),
            "INSIDE_DAY" | "INSIDE" => Ok(SetupKind::InsideDay),
            "BREAKOUT" => Ok(SetupKind::Breakout),
            _ => Err(format!("unknown setup kind '{s}'")),
        }
    }
}

// ─── Rejection reasons ───────────────────────────────────────────────

/// Why a detector did not produce a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WaitReason {
    InsufficientBars,
    NoPullback,
    FibOutOfBand,
    StaleLow,
    NoSupport,
    NoBouncePattern,
    WeakBounce,
    VolumeRegime,
    OverRecovered,
    NoHigherLow,
    BearishDivergence,
    InsufficientTaps,
    BaseTooLoose,
    NotThrough,
    GapTooLarge,
    NoVolumeExpansion,
    RsiTooHot,
    NoRetest,
    LevelLost,
    NoReclaim,
    RsiOutOfBand,
    WeakVolume,
    NotInsideBar,
    WeakClose,
    TrendNotUp,
    MissingIndicator,
}

impl std::fmt::Display for WaitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WaitReason::InsufficientBars => "insufficient bars",
            WaitReason::NoPullback => "no measurable pullback",
            WaitReason::FibOutOfBand => "retracement outside fib band",
            WaitReason::StaleLow => "pullback low too old",
            WaitReason::NoSupport => "low not at support",
            WaitReason::NoBouncePattern => "no bounce pattern",
            WaitReason::WeakBounce => "bounce too weak",
            WaitReason::VolumeRegime => "volume neither dry nor hot",
            WaitReason::OverRecovered => "pullback already recovered",
            WaitReason::NoHigherLow => "no higher low",
            WaitReason::BearishDivergence => "RSI bearish divergence into resistance",
            WaitReason::InsufficientTaps => "base has too few taps",
            WaitReason::BaseTooLoose => "base too deep",
            WaitReason::NotThrough => "close not through level",
            WaitReason::GapTooLarge => "opening gap too large",
            WaitReason::NoVolumeExpansion => "no volume expansion",
            WaitReason::RsiTooHot => "RSI too hot",
            WaitReason::NoRetest => "no retest of broken level",
            WaitReason::LevelLost => "broken level lost",
            WaitReason::NoReclaim => "no MA25 reclaim",
            WaitReason::RsiOutOfBand => "RSI outside band",
            WaitReason::WeakVolume => "volume too light",
            WaitReason::NotInsideBar => "not an inside bar",
            WaitReason::WeakClose => "weak close",
            WaitReason::TrendNotUp => "trend not up",
            WaitReason::MissingIndicator => "required indicator unknown",
        };
        f.write_str(s)
    }
}

// ─── Diagnostics ─────────────────────────────────────────────────────

/// Which support the dip low was found at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SupportKind {
    Ma20,
    Ma25,
    Ma50,
    PivotTouches,
    MicroCluster,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DipDiagnostics {
    pub swing_high: Option<f64>,
    pub pullback_low: Option<f64>,
    pub depth_pct: Option<f64>,
    pub depth_atr: Option<f64>,
    pub retracement: Option<f64>,
    pub fib_override: bool,
    pub low_age: Option<usize>,
    pub support: Option<SupportKind>,
    pub pattern: Option<BouncePattern>,
    pub bounce_atr: Option<f64>,
    pub pullback_volume_ratio: Option<f64>,
    pub bar_volume_ratio: Option<f64>,
    pub recovery: Option<f64>,
    pub recovery_cap: Option<f64>,
    pub reference_low: Option<f64>,
    pub divergence: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BreakoutDiagnostics {
    pub level: Option<f64>,
    pub taps: usize,
    pub base_depth_pct: Option<f64>,
    pub gap_pct: Option<f64>,
    pub volume_ratio: Option<f64>,
    pub rsi: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetestDiagnostics {
    pub level: Option<f64>,
    pub bars_since_break: Option<usize>,
    pub touch_age: Option<usize>,
    pub volume_ratio: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReclaimDiagnostics {
    pub ma25: Option<f64>,
    pub prev_ma25: Option<f64>,
    pub rsi: Option<f64>,
    pub volume_ratio: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsideDayDiagnostics {
    pub mother_high: Option<f64>,
    pub mother_low: Option<f64>,
    pub close_location: Option<f64>,
}

/// Structured per-kind diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SetupDiagnostics {
    DipBounce(DipDiagnostics),
    Breakout(BreakoutDiagnostics),
    Retest(RetestDiagnostics),
    Reclaim(ReclaimDiagnostics),
    InsideDay(InsideDayDiagnostics),
}

// ─── Outcomes ────────────────────────────────────────────────────────

/// A triggered setup with its raw (pre-RR) stop and target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupCandidate {
    pub kind: SetupKind,
    pub rationale: String,
    pub stop: f64,
    pub target: f64,
    pub nearest_resistance: Option<f64>,
    pub diagnostics: SetupDiagnostics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DetectorOutcome {
    Triggered(SetupCandidate),
    NotReady {
        reason: WaitReason,
        detail: String,
        diagnostics: Option<SetupDiagnostics>,
    },
}

impl DetectorOutcome {
    pub fn not_ready(reason: WaitReason, detail: impl Into<String>) -> Self {
        DetectorOutcome::NotReady {
            reason,
            detail: detail.into(),
            diagnostics: None,
        }
    }

    pub fn insufficient(have: usize, need: usize) -> Self {
        Self::not_ready(
            WaitReason::InsufficientBars,
            format!("{have} bars, need {need}"),
        )
    }

    /// Attach diagnostics to a `NotReady` outcome.
    pub fn with_diagnostics(self, diag: SetupDiagnostics) -> Self {
        match self {
            DetectorOutcome::NotReady { reason, detail, .. } => DetectorOutcome::NotReady {
                reason,
                detail,
                diagnostics: Some(diag),
            },
            triggered => triggered,
        }
    }

    pub fn is_triggered(&self) -> bool {
        matches!(self, DetectorOutcome::Triggered(_))
    }

    pub fn wait_reason(&self) -> Option<WaitReason> {
        match self {
            DetectorOutcome::NotReady { reason, .. } => Some(*reason),
            DetectorOutcome::Triggered(_) => None,
        }
    }
}

// ─── Detector trait ──────────────────────────────────────────────────

/// Everything a detector may read.
#[derive(Debug, Clone, Copy)]
pub struct SetupContext<'a> {
    pub input: &'a MarketInput,
    pub structure: &'a MarketStructure,
    pub atr: f64,
    /// Clustered resistance above entry, nearest first.
    pub resistances: &'a [f64],
}

impl SetupContext<'_> {
    pub fn entry(&self) -> f64 {
        self.input.snapshot.price
    }
}

pub trait SetupDetector: Send + Sync {
    fn kind(&self) -> SetupKind;

    /// Bars required before the detector can evaluate.
    fn min_bars(&self) -> usize;

    fn detect(&self, ctx: &SetupContext<'_>) -> DetectorOutcome;
}

/// Build the detector for `kind` from its config section.
pub fn detector_for(kind: SetupKind, config: &EngineConfig) -> Box<dyn SetupDetector> {
    match kind {
        SetupKind::DipBounce => Box::new(DipBounceDetector::new(config.dip.clone())),
        SetupKind::Retest => Box::new(RetestDetector::new(config.retest.clone())),
        SetupKind::Reclaim => Box::new(ReclaimDetector::new(config.reclaim.clone())),
        SetupKind::InsideDay => Box::new(InsideDayDetector::new(config.inside_day.clone())),
        SetupKind::Breakout => Box::new(BreakoutDetector::new(config.breakout.clone())),
    }
}
