//! End-to-end scenarios through `Evaluator`.
//!
//! 1. Clean dip to a rising MA25 with an engulfing bounce: buy now
//! 2. Breakout over a single-tap base with a big gap: breakout not ready
//! 3. The same dip with RSI over the hard ceiling: vetoed
//! 4. The dip at the bottom of a weekly range in a weekly uptrend: buy now
//! 5. Short history, guard ordering, sample accumulation, idempotence

use chrono::NaiveDate;
use swingentry_core::guards::GuardPipeline;
use swingentry_core::setups::WaitReason;
use swingentry_core::telemetry::BlockCode;
use swingentry_core::{
    DebugLevel, Decision, EngineConfig, EvaluateOptions, Evaluator, GuardSamples, PriceBar,
    RawSnapshot, SetupKind,
};

// ──────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────

fn day(i: usize) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i as i64)
}

fn bar(i: usize, open: f64, high: f64, low: f64, close: f64, volume: f64) -> PriceBar {
    PriceBar {
        date: day(i),
        open,
        high,
        low,
        close,
        volume,
    }
}

fn assert_approx(actual: f64, expected: f64, tol: f64) {
    assert!(
        (actual - expected).abs() <= tol,
        "expected {expected}, got {actual}"
    );
}

/// 30 bars starting at day `offset`: a slow base, a steady climb to a swing
/// high of 102.4, a six-bar pullback on light volume to 96.2 at the MA25,
/// then a bullish engulfing bar closing at 98.0 on heavy volume.
fn dip_bars(offset: usize) -> Vec<PriceBar> {
    let mut bars = Vec::with_capacity(30);
    for i in 0..10 {
        let close = 91.5 + 0.1 * i as f64;
        bars.push(bar(offset + i, close - 0.2, close + 0.3, close - 0.4, close, 1_000_000.0));
    }
    for i in 10..23 {
        let close = 92.4 + (i - 9) as f64 * 0.75;
        bars.push(bar(offset + i, close - 0.5, close + 0.25, close - 0.75, close, 1_000_000.0));
    }
    let pullback = [101.2, 100.2, 99.2, 98.2, 97.4, 96.8];
    for (k, close) in pullback.into_iter().enumerate() {
        let i = 23 + k;
        let open = bars[i - 1].close - 0.1;
        let low = if i == 28 { 96.2 } else { close - 0.3 };
        bars.push(bar(offset + i, open, open + 0.2, low, close, 600_000.0));
    }
    bars.push(bar(offset + 29, 96.6, 98.2, 96.4, 98.0, 1_800_000.0));
    bars
}

fn dip_snapshot() -> RawSnapshot {
    RawSnapshot {
        ticker: "DIP".into(),
        price: Some(98.0),
        atr14: Some(1.2),
        rsi14: Some(55.0),
        ma5: Some(97.92),
        ma20: Some(97.5),
        ma25: Some(96.86),
        ma50: Some(94.0),
        high_52w: Some(102.4),
        tick_size: Some(0.01),
        ..Default::default()
    }
}

fn evaluator(level: DebugLevel) -> Evaluator {
    Evaluator::new(EvaluateOptions {
        debug_level: level,
        ..Default::default()
    })
}

fn only(kind: SetupKind, level: DebugLevel) -> Evaluator {
    Evaluator::new(EvaluateOptions {
        allowed_kinds: vec![kind],
        debug_level: level,
        ..Default::default()
    })
}

fn assert_buy_plan(d: &Decision) {
    let entry = d.entry_price.unwrap();
    let stop = d.stop_loss.unwrap();
    let target = d.price_target.unwrap();
    assert!(stop < entry && entry < target, "bad geometry: {d:?}");
    assert_approx(d.ratio.unwrap(), (target - entry) / (entry - stop), 1e-9);
}

// ──────────────────────────────────────────────
// Scenario 1: dip to MA25 with an engulfing bounce
// ──────────────────────────────────────────────

#[test]
fn dip_to_rising_ma25_buys_now() {
    let d = evaluator(DebugLevel::Off).evaluate(&dip_snapshot(), &dip_bars(0));
    assert!(d.buy_now, "expected buy, got: {}", d.reason);
    assert_eq!(d.kind, Some(SetupKind::DipBounce));
    assert_buy_plan(&d);
    assert_approx(d.stop_loss.unwrap(), 95.6, 1e-9);
    assert_approx(d.price_target.unwrap(), 102.4, 1e-9);
    assert_approx(d.ratio.unwrap(), 4.4 / 2.4, 1e-9);
    assert!(!d.probation);
    assert!(d.reason.contains("RR 1.83"), "{}", d.reason);
}

#[test]
fn buy_carries_ratcheting_exit_timeline() {
    let d = evaluator(DebugLevel::Off).evaluate(&dip_snapshot(), &dip_bars(0));
    assert_eq!(d.timeline.len(), 4);
    // R = 2.4: breakeven at 100.4, lock at 101.6
    assert_approx(d.timeline[0].trigger_price.unwrap(), 100.4, 1e-9);
    assert_approx(d.timeline[0].stop, 98.0, 1e-9);
    assert_approx(d.timeline[1].stop, 99.2, 1e-9);
    assert!(d.timeline.windows(2).all(|w| w[1].stop >= w[0].stop));
}

#[test]
fn buy_records_guard_samples_in_telemetry() {
    let d = evaluator(DebugLevel::Off).evaluate(&dip_snapshot(), &dip_bars(0));
    let t = &d.telemetry;
    assert!(t.gates.is_empty());
    assert!(t.candidates.is_empty());
    assert!(!t.histograms.headroom_atr.is_empty());
    assert!(t.distributions.contains_key("headroom_atr"));
    assert!(t.distributions.contains_key("ma25_distance_atr"));
    assert_eq!(t.config_fingerprint, EngineConfig::balanced().fingerprint());
}

// ──────────────────────────────────────────────
// Scenario 2: breakout base with one tap and a gap
// ──────────────────────────────────────────────

/// 19 quiet bars, a 10-bar base under 102 tapped at 105 on `taps` bars, then
/// a gap from 102 to an open of 108.
fn gapped_base(taps: usize) -> Vec<PriceBar> {
    let mut bars: Vec<PriceBar> = (0..19)
        .map(|i| bar(i, 100.0, 100.5, 99.5, 100.0, 500_000.0))
        .collect();
    for i in 19..29 {
        bars.push(bar(i, 101.0, 102.0, 100.0, 101.5, 500_000.0));
    }
    bars[28].close = 102.0;
    for b in bars[24..24 + taps].iter_mut() {
        b.high = 105.0;
    }
    bars.push(bar(29, 108.0, 109.0, 107.5, 108.5, 1_500_000.0));
    bars
}

fn breakout_snapshot() -> RawSnapshot {
    RawSnapshot {
        ticker: "GAP".into(),
        price: Some(108.5),
        atr14: Some(1.5),
        rsi14: Some(65.0),
        tick_size: Some(0.01),
        ..Default::default()
    }
}

fn breakout_wait_reason(d: &Decision) -> Option<WaitReason> {
    d.telemetry
        .candidates
        .iter()
        .find(|c| c.kind == SetupKind::Breakout)
        .and_then(|c| c.outcome.wait_reason())
}

#[test]
fn single_tap_base_does_not_break_out() {
    let d = only(SetupKind::Breakout, DebugLevel::Full)
        .evaluate(&breakout_snapshot(), &gapped_base(1));
    assert!(!d.buy_now);
    assert_eq!(breakout_wait_reason(&d), Some(WaitReason::InsufficientTaps));
    assert!(d.reasons[0].starts_with("BREAKOUT: "), "{:?}", d.reasons);
    assert!(d.reason.starts_with("no entry: "));
    assert!(d
        .telemetry
        .blocks
        .iter()
        .any(|b| b.kind == Some(SetupKind::Breakout) && b.code == BlockCode::NotReady));
}

#[test]
fn tested_base_with_large_gap_does_not_break_out() {
    let d = only(SetupKind::Breakout, DebugLevel::Full)
        .evaluate(&breakout_snapshot(), &gapped_base(3));
    assert!(!d.buy_now);
    assert_eq!(breakout_wait_reason(&d), Some(WaitReason::GapTooLarge));
    assert!(d.reason.contains("opening gap too large"), "{}", d.reason);
}

#[test]
fn rejected_breakout_still_offers_provisional_plan() {
    let d = only(SetupKind::Breakout, DebugLevel::Off)
        .evaluate(&breakout_snapshot(), &gapped_base(1));
    assert!(!d.buy_now);
    assert_eq!(d.kind, None);
    assert!(d.timeline.is_empty());
    let stop = d.stop_loss.unwrap();
    assert!(stop < 108.5);
}

#[test]
fn breakout_block_carries_wait_reason_without_traces() {
    let d = only(SetupKind::Breakout, DebugLevel::Off)
        .evaluate(&breakout_snapshot(), &gapped_base(1));
    assert!(d.telemetry.candidates.is_empty());
    let block = d
        .telemetry
        .blocks
        .iter()
        .find(|b| b.kind == Some(SetupKind::Breakout))
        .unwrap();
    assert_eq!(block.gate, "detector");
    assert_eq!(block.code, BlockCode::NotReady);
    assert_eq!(block.wait_reason, Some(WaitReason::InsufficientTaps));
    assert!(block.rr_rejection.is_none());
}

// ──────────────────────────────────────────────
// Scenario 3: hot RSI vetoes the same dip
// ──────────────────────────────────────────────

#[test]
fn rsi_over_hard_ceiling_vetoes_dip() {
    let raw = RawSnapshot {
        rsi14: Some(79.0),
        ..dip_snapshot()
    };
    let d = evaluator(DebugLevel::Gates).evaluate(&raw, &dip_bars(0));
    assert!(!d.buy_now);
    assert!(d
        .reasons
        .iter()
        .any(|r| r.starts_with("DIP_BOUNCE: rsi_ceiling vetoed: RSI 79.0")));
    assert!(d
        .telemetry
        .blocks
        .iter()
        .any(|b| b.kind == Some(SetupKind::DipBounce) && b.code == BlockCode::RsiCeiling));
    let veto = d
        .telemetry
        .blocks
        .iter()
        .find(|b| b.gate == "guard:rsi_ceiling")
        .unwrap();
    assert_eq!(veto.details["rsi"], 79.0);
    // The veto is the first guard, so no later guard ran for the dip.
    let dip_guards: Vec<&str> = d
        .telemetry
        .gates
        .iter()
        .filter(|g| g.kind == Some(SetupKind::DipBounce) && g.stage.starts_with("guard:"))
        .map(|g| g.stage.as_str())
        .collect();
    assert_eq!(dip_guards, vec!["guard:rsi_ceiling"]);
}

// ──────────────────────────────────────────────
// Scenario 4: bottom of the weekly range in a weekly uptrend
// ──────────────────────────────────────────────

/// 150 rising bars to 149.4, a 20-bar slide to 91.4, then the dip series.
fn dip_after_long_run() -> Vec<PriceBar> {
    let mut bars: Vec<PriceBar> = (0..150)
        .map(|i| {
            let close = 60.0 + 0.6 * i as f64;
            bar(i, close - 0.3, close + 0.3, close - 0.5, close, 1_000_000.0)
        })
        .collect();
    for i in 150..170 {
        let open = bars[i - 1].close;
        let close = open - 2.9;
        bars.push(bar(i, open, open + 0.3, close - 0.3, close, 1_000_000.0));
    }
    bars.extend(dip_bars(170));
    bars
}

#[test]
fn weekly_bottom_in_uptrend_is_not_a_falling_knife() {
    let raw = RawSnapshot {
        high_52w: Some(149.7),
        ..dip_snapshot()
    };
    let d = evaluator(DebugLevel::Gates).evaluate(&raw, &dip_after_long_run());
    assert!(d.buy_now, "expected buy, got: {}", d.reason);
    assert_eq!(d.kind, Some(SetupKind::DipBounce));
    assert_buy_plan(&d);

    let weekly = d
        .telemetry
        .gates
        .iter()
        .find(|g| g.kind == Some(SetupKind::DipBounce) && g.stage == "guard:weekly_range")
        .unwrap();
    assert!(weekly.passed);
    assert!(
        weekly.detail.contains("weekly trend not confirmed down"),
        "{}",
        weekly.detail
    );
}

// ──────────────────────────────────────────────
// Edge cases and pipeline contracts
// ──────────────────────────────────────────────

#[test]
fn short_history_is_negative_with_percent_plan() {
    let bars = dip_bars(0)[20..].to_vec();
    let d = evaluator(DebugLevel::Off).evaluate(&dip_snapshot(), &bars);
    assert!(!d.buy_now);
    assert!(d.reason.contains("insufficient data"), "{}", d.reason);
    assert_approx(d.stop_loss.unwrap(), 94.08, 1e-9);
    assert_approx(d.price_target.unwrap(), 105.84, 1e-9);
    assert!(d
        .telemetry
        .blocks
        .iter()
        .any(|b| b.code == BlockCode::InvalidInput && b.gate == "input"));
}

#[test]
fn guards_run_in_pipeline_order() {
    let d = evaluator(DebugLevel::Full).evaluate(&dip_snapshot(), &dip_bars(0));
    let dip = d
        .telemetry
        .candidates
        .iter()
        .find(|c| c.kind == SetupKind::DipBounce)
        .unwrap();
    let ran: Vec<&str> = dip.guards.iter().map(|g| g.guard.as_str()).collect();
    let expected = GuardPipeline::standard(&EngineConfig::balanced().guards).names();
    assert_eq!(ran, expected);
    assert!(dip.guards.iter().all(|g| !g.verdict.veto));
}

#[test]
fn candidates_traced_in_kind_order() {
    let d = evaluator(DebugLevel::Full).evaluate(&dip_snapshot(), &dip_bars(0));
    let kinds: Vec<SetupKind> = d.telemetry.candidates.iter().map(|c| c.kind).collect();
    assert_eq!(kinds, SetupKind::ALL.to_vec());
}

#[test]
fn batch_accumulator_collects_every_call() {
    let eval = evaluator(DebugLevel::Off);
    let mut samples = GuardSamples::new();
    let first = eval.evaluate_raw(&dip_snapshot(), &dip_bars(0), &mut samples);
    let per_call = samples.headroom_atr.len();
    assert!(per_call > 0);
    assert_eq!(first.telemetry.histograms.headroom_atr.len(), per_call);

    let second = eval.evaluate_raw(&dip_snapshot(), &dip_bars(0), &mut samples);
    assert_eq!(samples.headroom_atr.len(), 2 * per_call);
    // Each call's telemetry only holds its own samples.
    assert_eq!(second.telemetry.histograms.headroom_atr.len(), per_call);
}

#[test]
fn evaluation_is_idempotent() {
    let eval = evaluator(DebugLevel::Gates);
    let a = eval.evaluate(&dip_snapshot(), &dip_bars(0));
    let b = eval.evaluate(&dip_snapshot(), &dip_bars(0));
    assert_eq!(a, b);
}

#[test]
fn bar_order_does_not_matter() {
    let eval = evaluator(DebugLevel::Off);
    let mut shuffled = dip_bars(0);
    shuffled.reverse();
    let a = eval.evaluate(&dip_snapshot(), &dip_bars(0));
    let b = eval.evaluate(&dip_snapshot(), &shuffled);
    assert_eq!(a.buy_now, b.buy_now);
    assert_eq!(a.stop_loss, b.stop_loss);
    assert_eq!(a.price_target, b.price_target);
}

#[test]
fn decision_serializes_camel_case() {
    let d = evaluator(DebugLevel::Off).evaluate(&dip_snapshot(), &dip_bars(0));
    let json = serde_json::to_value(&d).unwrap();
    assert_eq!(json["buyNow"], true);
    assert_eq!(json["kind"], "DIP_BOUNCE");
    assert!(json["stopLoss"].is_number());
    assert!(json["telemetry"]["configFingerprint"].is_string());
}
