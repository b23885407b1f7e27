//! Criterion benchmarks for the decision hot path.
//!
//! Benchmarks:
//! 1. Full evaluation per history length
//! 2. Evaluation at each debug level
//! 3. A 100-instrument sequential batch with a shared sample accumulator
//! 4. Level extraction and supply-wall scan

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use swingentry_core::levels::{resistance_levels, support_levels};
use swingentry_core::risk::detect_walls;
use swingentry_core::{
    DebugLevel, EngineConfig, EvaluateOptions, Evaluator, GuardSamples, PriceBar, RawSnapshot,
};

// ── Helpers ──────────────────────────────────────────────────────────

/// Seeded random-walk bars so every run benchmarks the same series.
fn make_bars(n: usize, seed: u64) -> Vec<PriceBar> {
    let mut rng = StdRng::seed_from_u64(seed);
    let base_date = chrono::NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();
    let mut close = 100.0_f64;
    (0..n)
        .map(|i| {
            let open = close;
            close = (close * (1.0 + rng.gen_range(-0.025..0.03))).max(1.0);
            let wick = rng.gen_range(0.002..0.015) * close;
            PriceBar {
                date: base_date + chrono::Duration::days(i as i64),
                open,
                high: open.max(close) + wick,
                low: open.min(close) - wick,
                close,
                volume: rng.gen_range(200_000.0..3_000_000.0),
            }
        })
        .collect()
}

fn snapshot(rsi: f64) -> RawSnapshot {
    RawSnapshot {
        ticker: "BENCH".into(),
        rsi14: Some(rsi),
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

// ── 1. Evaluation by history length ──────────────────────────────────

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");
    let eval = evaluator(DebugLevel::Off);
    for n in [60, 250, 1000] {
        let bars = make_bars(n, 7);
        group.bench_with_input(BenchmarkId::new("bars", n), &bars, |b, bars| {
            b.iter(|| eval.evaluate(black_box(&snapshot(55.0)), black_box(bars)))
        });
    }
    group.finish();
}

// ── 2. Debug level overhead ──────────────────────────────────────────

fn bench_debug_levels(c: &mut Criterion) {
    let mut group = c.benchmark_group("debug_level");
    let bars = make_bars(250, 11);
    for level in [DebugLevel::Off, DebugLevel::Gates, DebugLevel::Full] {
        let eval = evaluator(level);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{level:?}")),
            &bars,
            |b, bars| b.iter(|| eval.evaluate(black_box(&snapshot(55.0)), black_box(bars))),
        );
    }
    group.finish();
}

// ── 3. Batch with shared accumulator ─────────────────────────────────

fn bench_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch");
    let universe: Vec<Vec<PriceBar>> = (0..100).map(|s| make_bars(250, s)).collect();
    let eval = evaluator(DebugLevel::Off);
    group.bench_function("100_instruments_250_bars", |b| {
        b.iter(|| {
            let mut samples = GuardSamples::new();
            let buys = universe
                .iter()
                .filter(|bars| eval.evaluate_raw(&snapshot(55.0), bars, &mut samples).buy_now)
                .count();
            black_box((buys, samples.distributions()))
        })
    });
    group.finish();
}

// ── 4. Structural scans ──────────────────────────────────────────────

fn bench_levels(c: &mut Criterion) {
    let mut group = c.benchmark_group("levels");
    let config = EngineConfig::balanced();
    let bars = make_bars(500, 3);
    let price = bars[bars.len() - 1].close;
    group.bench_function("resistance_support_500", |b| {
        b.iter(|| {
            let r = resistance_levels(
                black_box(&bars),
                price,
                None,
                config.levels.resistance_lookback,
                config.levels.cluster_tolerance_pct,
            );
            let s = support_levels(
                black_box(&bars),
                price,
                config.levels.support_lookback,
                config.levels.cluster_tolerance_pct,
            );
            (r, s)
        })
    });
    group.bench_function("supply_walls_500", |b| {
        b.iter(|| detect_walls(black_box(&bars), &config.risk))
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_evaluate,
    bench_debug_levels,
    bench_batch,
    bench_levels
);
criterion_main!(benches);
