//! Decision combiner.
//!
//! Orchestrates detector → RR engine → guard pipeline for every enabled kind
//! in the fixed evaluation order, collects a reason for every rejection, and
//! picks the surviving candidate with the best kind priority (ties by RR).
//!
//! The evaluator never returns an error. Invalid input, zero survivors and
//! every per-candidate rejection all resolve to a `Decision` with
//! `buy_now = false` and a provisional, ungated plan where one can be derived.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{EngineConfig, Sentiment};
use crate::domain::{
    round_to_tick, InputError, MarketInput, PriceBar, RawSnapshot, Snapshot, TickPolicy,
    TickTable,
};
use crate::exits::{build_timeline, ExitMilestone, TimelineInputs};
use crate::guards::{GuardContext, GuardPipeline, MarketContext};
use crate::levels::{resistance_levels, support_levels};
use crate::risk::{
    self, detect_walls, min_stop_atr, ExternalScore, RiskInputs, RiskRewardResult, RrRejection,
    SupplyWall,
};
use crate::setups::{
    detector_for, DetectorOutcome, SetupCandidate, SetupContext, SetupDetector, SetupKind,
};
use crate::structure::MarketStructure;
use crate::telemetry::{Block, BlockCode, CandidateTrace, DebugLevel, GuardSamples, Telemetry};

/// Percent-based plan used when the input cannot be evaluated structurally.
const FALLBACK_STOP_PCT: f64 = 4.0;
const FALLBACK_TARGET_PCT: f64 = 8.0;
/// Fallback stop sits this many ATR under the nearest support.
const FALLBACK_SUPPORT_BUFFER_ATR: f64 = 0.25;
/// Fallback target in ATR when no resistance is overhead.
const FALLBACK_TARGET_ATR: f64 = 2.0;
/// Float noise tolerated when re-checking a rounded ratio.
const RATIO_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct EvaluateOptions {
    pub config: EngineConfig,
    /// Kinds to run; evaluation order is always the fixed priority order.
    pub allowed_kinds: Vec<SetupKind>,
    pub sentiment: Option<Sentiment>,
    pub debug_level: DebugLevel,
    pub market: Option<MarketContext>,
    pub external_score: Option<ExternalScore>,
}

impl Default for EvaluateOptions {
    fn default() -> Self {
        Self {
            config: EngineConfig::balanced(),
            allowed_kinds: SetupKind::ALL.to_vec(),
            sentiment: None,
            debug_level: DebugLevel::Off,
            market: None,
            external_score: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub buy_now: bool,
    pub reason: String,
    pub reasons: Vec<String>,
    pub kind: Option<SetupKind>,
    pub entry_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub price_target: Option<f64>,
    pub ratio: Option<f64>,
    pub probation: bool,
    pub timeline: Vec<ExitMilestone>,
    pub telemetry: Telemetry,
}

/// A tick-rounded stop/target pair and its ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Plan {
    stop: f64,
    target: f64,
    ratio: f64,
}

struct Survivor {
    candidate: SetupCandidate,
    rr: RiskRewardResult,
    plan: Plan,
}

/// Per-call derived market state shared by every stage.
struct Frame<'a> {
    input: &'a MarketInput,
    structure: MarketStructure,
    resistances: Vec<f64>,
    supports: Vec<f64>,
    walls: Vec<SupplyWall>,
    tick: f64,
}

pub struct Evaluator {
    config: EngineConfig,
    fingerprint: String,
    detectors: Vec<Box<dyn SetupDetector>>,
    pipeline: GuardPipeline,
    debug_level: DebugLevel,
    market: Option<MarketContext>,
    external_score: Option<ExternalScore>,
    tick_table: TickTable,
}

impl Evaluator {
    pub fn new(options: EvaluateOptions) -> Self {
        let config = match options.sentiment {
            Some(s) => options.config.with_sentiment(s),
            None => options.config,
        };
        let detectors = SetupKind::ALL
            .iter()
            .filter(|k| options.allowed_kinds.contains(k))
            .map(|k| detector_for(*k, &config))
            .collect();
        Self {
            fingerprint: config.fingerprint(),
            pipeline: GuardPipeline::standard(&config.guards),
            detectors,
            config,
            debug_level: options.debug_level,
            market: options.market,
            external_score: options.external_score,
            tick_table: TickTable::standard(),
        }
    }

    /// Replace the price-tier table used when the snapshot has no tick size.
    pub fn with_tick_table(mut self, table: TickTable) -> Self {
        self.tick_table = table;
        self
    }

    /// Effective configuration (sentiment applied).
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn kinds(&self) -> Vec<SetupKind> {
        self.detectors.iter().map(|d| d.kind()).collect()
    }

    /// Fewest bars any enabled detector can work with.
    pub fn min_bars(&self) -> usize {
        self.detectors
            .iter()
            .map(|d| d.min_bars())
            .min()
            .unwrap_or(crate::domain::input::ATR_PERIOD + 1)
    }

    /// Evaluate one instrument with a fresh sample accumulator.
    pub fn evaluate(&self, raw: &RawSnapshot, bars: &[PriceBar]) -> Decision {
        let mut samples = GuardSamples::new();
        self.evaluate_raw(raw, bars, &mut samples)
    }

    /// Validate and evaluate, appending this call's samples to `samples`.
    pub fn evaluate_raw(
        &self,
        raw: &RawSnapshot,
        bars: &[PriceBar],
        samples: &mut GuardSamples,
    ) -> Decision {
        match MarketInput::validate(raw, bars, self.min_bars()) {
            Ok(input) => self.evaluate_with_samples(&input, samples),
            Err(err) => self.rejected_input(raw, bars, &err),
        }
    }

    /// Evaluate a validated input.
    ///
    /// The call's own samples land in its telemetry and are also merged into
    /// `samples`, so a sequential batch can keep a running accumulator.
    pub fn evaluate_with_samples(
        &self,
        input: &MarketInput,
        samples: &mut GuardSamples,
    ) -> Decision {
        let mut telemetry = Telemetry::new(self.fingerprint.clone(), self.debug_level);
        telemetry.external_score = self.external_score;
        let mut local = GuardSamples::new();

        let frame = self.frame(input);
        let snap = &input.snapshot;
        let entry = snap.price;
        let atr = snap.atr;
        telemetry.gate(
            "structure",
            None,
            true,
            format!(
                "trend {} (score {}, MA stack {}), {} resistance / {} support, {} walls",
                frame.structure.trend,
                frame.structure.score,
                if frame.structure.stacked_bullish {
                    "bullish"
                } else {
                    "mixed"
                },
                frame.resistances.len(),
                frame.supports.len(),
                frame.walls.len()
            ),
        );

        let mut reasons = Vec::new();
        if self.detectors.is_empty() {
            reasons.push("no setup kinds enabled".to_string());
        }
        let mut survivors = Vec::new();
        for detector in &self.detectors {
            if let Some(s) = self.run_candidate(
                detector.as_ref(),
                &frame,
                &mut telemetry,
                &mut local,
                &mut reasons,
            ) {
                survivors.push(s);
            }
        }
        dedup_in_order(&mut reasons);

        let best = survivors.into_iter().min_by(|a, b| {
            a.candidate
                .kind
                .priority()
                .cmp(&b.candidate.kind.priority())
                .then_with(|| b.plan.ratio.total_cmp(&a.plan.ratio))
        });

        let mut decision = match best {
            Some(s) => {
                let plan = s.plan;
                let floor = frame
                    .supports
                    .first()
                    .copied()
                    .map_or(plan.stop, |sup| sup.max(plan.stop));
                let timeline = build_timeline(
                    &self.config.exits,
                    &TimelineInputs {
                        entry,
                        stop: plan.stop,
                        atr,
                        ma25: frame.structure.averages.ma25,
                        floor,
                        tick: frame.tick,
                    },
                );
                let probation = if s.rr.probation { " (probation)" } else { "" };
                Decision {
                    buy_now: true,
                    reason: format!(
                        "{}{probation}: entry {entry:.2}, stop {:.2}, target {:.2}, RR {:.2}",
                        s.candidate.rationale, plan.stop, plan.target, plan.ratio
                    ),
                    reasons,
                    kind: Some(s.candidate.kind),
                    entry_price: Some(entry),
                    stop_loss: Some(plan.stop),
                    price_target: Some(plan.target),
                    ratio: Some(plan.ratio),
                    probation: s.rr.probation,
                    timeline,
                    telemetry,
                }
            }
            None => {
                let plan = self.fallback_plan(&frame);
                Decision {
                    buy_now: false,
                    reason: format!("no entry: {}", reasons.join("; ")),
                    reasons,
                    kind: None,
                    entry_price: Some(entry),
                    stop_loss: plan.map(|p| p.stop),
                    price_target: plan.map(|p| p.target),
                    ratio: plan.map(|p| p.ratio),
                    probation: false,
                    timeline: Vec::new(),
                    telemetry,
                }
            }
        };

        decision.telemetry.finish(&local);
        samples.merge(&local);
        info!(
            ticker = %snap.ticker,
            buy_now = decision.buy_now,
            kind = ?decision.kind,
            stop = ?decision.stop_loss,
            target = ?decision.price_target,
            ratio = ?decision.ratio,
            "entry decision"
        );
        decision
    }

    fn frame<'a>(&self, input: &'a MarketInput) -> Frame<'a> {
        let snap = &input.snapshot;
        let levels = &self.config.levels;
        Frame {
            input,
            structure: MarketStructure::analyze(input),
            resistances: resistance_levels(
                &input.bars,
                snap.price,
                snap.high_52w,
                levels.resistance_lookback,
                levels.cluster_tolerance_pct,
            ),
            supports: support_levels(
                &input.bars,
                snap.price,
                levels.support_lookback,
                levels.cluster_tolerance_pct,
            ),
            walls: detect_walls(&input.bars, &self.config.risk),
            tick: self.tick_for(snap),
        }
    }

    /// One detector through RR and guards. `Some` when the candidate survives.
    fn run_candidate(
        &self,
        detector: &dyn SetupDetector,
        frame: &Frame<'_>,
        telemetry: &mut Telemetry,
        samples: &mut GuardSamples,
        reasons: &mut Vec<String>,
    ) -> Option<Survivor> {
        let input = frame.input;
        let snap = &input.snapshot;
        let kind = detector.kind();
        let ctx = SetupContext {
            input,
            structure: &frame.structure,
            atr: snap.atr,
            resistances: &frame.resistances,
        };

        let outcome = detector.detect(&ctx);
        debug!(kind = %kind, triggered = outcome.is_triggered(), "detector evaluated");
        let candidate = match &outcome {
            DetectorOutcome::NotReady { reason, detail, .. } => {
                let text = format!("{kind}: {reason} ({detail})");
                telemetry.gate("detector", Some(kind), false, text.clone());
                telemetry.block(
                    Block::new("detector", Some(kind), BlockCode::NotReady, text.clone())
                        .with_wait_reason(*reason),
                );
                reasons.push(text);
                telemetry.trace(CandidateTrace {
                    kind,
                    outcome,
                    rr: None,
                    guards: Vec::new(),
                });
                return None;
            }
            DetectorOutcome::Triggered(c) => c.clone(),
        };
        telemetry.gate("detector", Some(kind), true, candidate.rationale.clone());

        let rr = risk::evaluate(
            &self.config.risk,
            &RiskInputs {
                kind,
                entry: snap.price,
                stop: candidate.stop,
                target: candidate.target,
                atr: snap.atr,
                trend: frame.structure.trend,
                rsi: snap.rsi,
                resistances: &frame.resistances,
                walls: &frame.walls,
                external: self.external_score,
            },
        );
        if !matches!(rr.rejection, Some(RrRejection::InvalidGeometry { .. })) {
            samples.record_rr_shortfall(rr.shortfall());
        }
        debug!(
            kind = %kind,
            acceptable = rr.acceptable,
            ratio = rr.ratio,
            required = rr.required,
            "risk/reward evaluated"
        );
        if let Some(block) = rr.scoot.block.as_ref().filter(|_| rr.scoot.attempted) {
            telemetry.gate("scoot", Some(kind), false, block.to_string());
        }

        if !rr.acceptable {
            let (code, why) = match &rr.rejection {
                Some(r @ RrRejection::InvalidGeometry { .. }) => {
                    (BlockCode::RrInvalid, r.to_string())
                }
                Some(r @ RrRejection::HorizonExceeded { .. }) => {
                    (BlockCode::HorizonExceeded, r.to_string())
                }
                Some(r @ RrRejection::BelowRequired { .. }) => {
                    (BlockCode::RrBelowRequired, r.to_string())
                }
                None => (BlockCode::RrBelowRequired, "RR not acceptable".to_string()),
            };
            let text = match &rr.scoot.block {
                Some(block) if rr.scoot.attempted => format!("{kind}: {why}; scoot: {block}"),
                _ => format!("{kind}: {why}"),
            };
            telemetry.gate("rr", Some(kind), false, text.clone());
            let mut block = Block::new("rr", Some(kind), code, text.clone());
            if let Some(r) = &rr.rejection {
                block = block.with_rr_rejection(r.clone());
            }
            telemetry.block(block);
            reasons.push(text);
            telemetry.trace(CandidateTrace {
                kind,
                outcome,
                rr: Some(rr),
                guards: Vec::new(),
            });
            return None;
        }
        let slack = self.config.risk.probation_slack;
        let plan = match rounded_plan(snap.price, &rr, slack, frame.tick) {
            Ok(plan) => plan,
            Err(rejection) => {
                let text = format!("{kind}: {rejection} after tick rounding");
                telemetry.gate("rr", Some(kind), false, text.clone());
                telemetry.block(
                    Block::new("rr", Some(kind), BlockCode::RrBelowRequired, text.clone())
                        .with_rr_rejection(rejection),
                );
                reasons.push(text);
                telemetry.trace(CandidateTrace {
                    kind,
                    outcome,
                    rr: Some(rr),
                    guards: Vec::new(),
                });
                return None;
            }
        };
        telemetry.gate(
            "rr",
            Some(kind),
            true,
            format!("RR {:.2} >= {:.2}", plan.ratio, rr.required),
        );

        let gctx = GuardContext {
            input,
            structure: &frame.structure,
            kind,
            entry: snap.price,
            stop: rr.stop,
            target: rr.target,
            atr: snap.atr,
            resistances: &frame.resistances,
            walls: &frame.walls,
            market: self.market.as_ref(),
            tick: frame.tick,
        };
        let guards = self.pipeline.run(&gctx, samples);
        for w in &guards.warnings {
            telemetry.warn(w.clone());
        }
        for t in &guards.traces {
            telemetry.gate(
                format!("guard:{}", t.guard),
                Some(kind),
                !t.verdict.veto,
                t.verdict.reason.clone(),
            );
        }
        let vetoed = guards.veto.clone();
        telemetry.trace(CandidateTrace {
            kind,
            outcome,
            rr: Some(rr.clone()),
            guards: guards.traces,
        });

        if let Some(veto) = vetoed {
            let text = format!("{kind}: {} vetoed: {}", veto.guard, veto.verdict.reason);
            telemetry.block(
                Block::new(
                    format!("guard:{}", veto.guard),
                    Some(kind),
                    veto.verdict.code.unwrap_or(BlockCode::NotReady),
                    text.clone(),
                )
                .with_details(veto.verdict.details.clone()),
            );
            reasons.push(text);
            return None;
        }
        Some(Survivor {
            candidate,
            rr,
            plan,
        })
    }

    /// Nearest structural support/resistance through the RR engine, ungated.
    fn fallback_plan(&self, frame: &Frame<'_>) -> Option<Plan> {
        let snap = &frame.input.snapshot;
        let entry = snap.price;
        let atr = snap.atr;
        let stop = frame
            .supports
            .first()
            .map(|s| s - FALLBACK_SUPPORT_BUFFER_ATR * atr)
            .unwrap_or_else(|| {
                entry - min_stop_atr(&self.config.risk, frame.structure.trend) * atr
            });
        let target = frame
            .resistances
            .first()
            .copied()
            .unwrap_or(entry + FALLBACK_TARGET_ATR * atr);
        // Structural stop, so evaluated as dip-style.
        let rr = risk::evaluate(
            &self.config.risk,
            &RiskInputs {
                kind: SetupKind::DipBounce,
                entry,
                stop,
                target,
                atr,
                trend: frame.structure.trend,
                rsi: snap.rsi,
                resistances: &frame.resistances,
                walls: &frame.walls,
                external: self.external_score,
            },
        );
        if matches!(rr.rejection, Some(RrRejection::InvalidGeometry { .. })) {
            return percent_plan(entry, frame.tick);
        }
        Some(round_plan(entry, rr.stop, rr.target, frame.tick))
    }

    fn rejected_input(&self, raw: &RawSnapshot, bars: &[PriceBar], err: &InputError) -> Decision {
        let mut telemetry = Telemetry::new(self.fingerprint.clone(), self.debug_level);
        telemetry.external_score = self.external_score;
        let reason = err.to_string();
        telemetry.gate("input", None, false, reason.clone());
        telemetry.block(Block::new(
            "input",
            None,
            BlockCode::InvalidInput,
            reason.clone(),
        ));
        telemetry.finish(&GuardSamples::new());

        let price = crate::domain::snapshot::positive(raw.price).or_else(|| {
            bars.iter()
                .rev()
                .map(|b| b.close)
                .find(|c| c.is_finite() && *c > 0.0)
        });
        let plan = price.and_then(|p| {
            let tick = positive_tick(raw.tick_size).unwrap_or_else(|| self.tick_table.tick_for(p));
            percent_plan(p, tick)
        });
        info!(ticker = %raw.ticker, reason = %reason, "input rejected");
        Decision {
            buy_now: false,
            reason: reason.clone(),
            reasons: vec![reason],
            kind: None,
            entry_price: price,
            stop_loss: plan.map(|p| p.stop),
            price_target: plan.map(|p| p.target),
            ratio: plan.map(|p| p.ratio),
            probation: false,
            timeline: Vec::new(),
            telemetry,
        }
    }

    fn tick_for(&self, snap: &Snapshot) -> f64 {
        snap.tick_size
            .unwrap_or_else(|| self.tick_table.tick_for(snap.price))
    }

}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator")
            .field("mode", &self.config.mode)
            .field("fingerprint", &self.fingerprint)
            .field("kinds", &self.kinds())
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

/// Round stop down and target up, then recompute the ratio.
fn round_plan(entry: f64, stop: f64, target: f64, tick: f64) -> Plan {
    let stop = round_to_tick(stop, tick, TickPolicy::RoundDown);
    let target = round_to_tick(target, tick, TickPolicy::RoundUp);
    Plan {
        stop,
        target,
        ratio: (target - entry) / (entry - stop),
    }
}

/// Tick-round an accepted RR result and re-check it against the threshold
/// it was accepted under (required, less the slack when on probation).
fn rounded_plan(
    entry: f64,
    rr: &RiskRewardResult,
    probation_slack: f64,
    tick: f64,
) -> Result<Plan, RrRejection> {
    let plan = round_plan(entry, rr.stop, rr.target, tick);
    let threshold = if rr.probation {
        rr.required - probation_slack
    } else {
        rr.required
    };
    if plan.ratio + RATIO_EPSILON < threshold {
        return Err(RrRejection::BelowRequired {
            ratio: plan.ratio,
            required: threshold,
        });
    }
    Ok(plan)
}

fn positive_tick(tick: Option<f64>) -> Option<f64> {
    tick.filter(|t| t.is_finite() && *t > 0.0)
}

fn percent_plan(price: f64, tick: f64) -> Option<Plan> {
    if !(price.is_finite() && price > 0.0) {
        return None;
    }
    let stop = round_to_tick(
        price * (1.0 - FALLBACK_STOP_PCT / 100.0),
        tick,
        TickPolicy::RoundDown,
    );
    let target = round_to_tick(
        price * (1.0 + FALLBACK_TARGET_PCT / 100.0),
        tick,
        TickPolicy::RoundUp,
    );
    (stop < price && target > price).then(|| Plan {
        stop,
        target,
        ratio: (target - price) / (price - stop),
    })
}

fn dedup_in_order(reasons: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    reasons.retain(|r| seen.insert(r.clone()));
}
