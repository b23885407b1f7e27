//! Guard/veto pipeline.
//!
//! Guards run in a fixed order against a candidate whose RR plan was
//! accepted. The first veto is terminal for that candidate; later guards do
//! not run. Guards that cannot judge (unknown indicator, too little history,
//! no market context) pass with a note rather than veto.

pub mod extension;
pub mod market;
pub mod momentum;
pub mod weekly;

pub use extension::{HeadroomGuard, Ma25DistanceGuard, SupplyWallGuard};
pub use market::{LiquidityGuard, MarketContext, MarketImpulseGuard};
pub use momentum::{RsiCeilingGuard, UpStreakGuard};
pub use weekly::WeeklyRangeGuard;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GuardConfig;
use crate::domain::MarketInput;
use crate::risk::SupplyWall;
use crate::setups::SetupKind;
use crate::structure::MarketStructure;
use crate::telemetry::{BlockCode, GuardSamples, GuardTrace};

/// Everything a guard may read for one candidate.
#[derive(Debug, Clone, Copy)]
pub struct GuardContext<'a> {
    pub input: &'a MarketInput,
    pub structure: &'a MarketStructure,
    pub kind: SetupKind,
    pub entry: f64,
    /// Stop and target after the RR engine (SCOOT and horizon applied).
    pub stop: f64,
    pub target: f64,
    pub atr: f64,
    /// Clustered resistance above entry, nearest first.
    pub resistances: &'a [f64],
    pub walls: &'a [SupplyWall],
    pub market: Option<&'a MarketContext>,
    pub tick: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardVerdict {
    pub veto: bool,
    pub code: Option<BlockCode>,
    pub reason: String,
    pub details: BTreeMap<String, f64>,
    pub warning: Option<String>,
}

impl GuardVerdict {
    pub fn pass(reason: impl Into<String>) -> Self {
        Self {
            veto: false,
            code: None,
            reason: reason.into(),
            details: BTreeMap::new(),
            warning: None,
        }
    }

    pub fn veto(code: BlockCode, reason: impl Into<String>) -> Self {
        Self {
            veto: true,
            code: Some(code),
            reason: reason.into(),
            details: BTreeMap::new(),
            warning: None,
        }
    }

    pub fn with_detail(mut self, key: &str, value: f64) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }
}

pub trait Guard: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(&self, ctx: &GuardContext<'_>, samples: &mut GuardSamples) -> GuardVerdict;
}

/// Result of running the pipeline over one candidate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineOutcome {
    /// Every guard that ran, in order. The last one vetoed if `veto` is set.
    pub traces: Vec<GuardTrace>,
    pub veto: Option<GuardTrace>,
    pub warnings: Vec<String>,
}

impl PipelineOutcome {
    pub fn passed(&self) -> bool {
        self.veto.is_none()
    }
}

pub struct GuardPipeline {
    guards: Vec<Box<dyn Guard>>,
}

impl GuardPipeline {
    pub fn new(guards: Vec<Box<dyn Guard>>) -> Self {
        Self { guards }
    }

    /// The eight standard guards in their fixed order.
    pub fn standard(config: &GuardConfig) -> Self {
        Self::new(vec![
            Box::new(RsiCeilingGuard::new(config)),
            Box::new(HeadroomGuard::new(config)),
            Box::new(Ma25DistanceGuard::new(config)),
            Box::new(UpStreakGuard::new(config)),
            Box::new(SupplyWallGuard),
            Box::new(WeeklyRangeGuard::new(config)),
            Box::new(MarketImpulseGuard::new(config)),
            Box::new(LiquidityGuard::new(config)),
        ])
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.guards.iter().map(|g| g.name()).collect()
    }

    /// Run guards in order, stopping at the first veto.
    pub fn run(&self, ctx: &GuardContext<'_>, samples: &mut GuardSamples) -> PipelineOutcome {
        let mut out = PipelineOutcome::default();
        for guard in &self.guards {
            let verdict = guard.evaluate(ctx, samples);
            debug!(
                guard = guard.name(),
                kind = %ctx.kind,
                veto = verdict.veto,
                reason = %verdict.reason,
                "guard evaluated"
            );
            if let Some(w) = &verdict.warning {
                out.warnings.push(w.clone());
            }
            let trace = GuardTrace {
                guard: guard.name().to_string(),
                verdict,
            };
            out.traces.push(trace.clone());
            if trace.verdict.veto {
                out.veto = Some(trace);
                break;
            }
        }
        out
    }
}

impl std::fmt::Debug for GuardPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardPipeline")
            .field("guards", &self.names())
            .finish()
    }
}

/// Owned test context for guard unit tests.
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::domain::{PriceBar, RawSnapshot};

    pub struct Case {
        pub input: MarketInput,
        pub structure: MarketStructure,
        pub kind: SetupKind,
        pub stop: f64,
        pub target: f64,
        pub resistances: Vec<f64>,
        pub walls: Vec<SupplyWall>,
        pub market: Option<MarketContext>,
        pub tick: f64,
    }

    impl Case {
        pub fn new(raw: RawSnapshot, bars: Vec<PriceBar>) -> Self {
            let input = MarketInput::validate(&raw, &bars, 1).unwrap();
            let structure = MarketStructure::analyze(&input);
            let entry = input.snapshot.price;
            let atr = input.snapshot.atr;
            Self {
                input,
                structure,
                kind: SetupKind::DipBounce,
                stop: entry - 2.0 * atr,
                target: entry + 4.0 * atr,
                resistances: Vec::new(),
                walls: Vec::new(),
                market: None,
                tick: 0.01,
            }
        }

        /// Quiet, liquid, flat instrument at 100 with ATR 1.
        pub fn calm() -> Self {
            let raw = RawSnapshot {
                ticker: "CALM".into(),
                price: Some(100.0),
                atr14: Some(1.0),
                rsi14: Some(55.0),
                ma25: Some(99.5),
                tick_size: Some(0.01),
                ..Default::default()
            };
            Self::new(raw, crate::setups::fixtures::flat(30, 100.0, 1_000_000.0))
        }

        pub fn ctx(&self) -> GuardContext<'_> {
            GuardContext {
                input: &self.input,
                structure: &self.structure,
                kind: self.kind,
                entry: self.input.snapshot.price,
                stop: self.stop,
                target: self.target,
                atr: self.input.snapshot.atr,
                resistances: &self.resistances,
                walls: &self.walls,
                market: self.market.as_ref(),
                tick: self.tick,
            }
        }
    }
}
