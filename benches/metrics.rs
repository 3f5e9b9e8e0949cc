//! Benchmarks for risk metric computation and alert gating.
//!
//! Run with: `cargo bench --bench metrics`

use alert_engine::metrics::{
    expected_shortfall, max_drawdown, sharpe_ratio, sortino_ratio, value_at_risk,
};
use alert_engine::{CooldownGate, RiskMetricsSnapshot};
use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use sentinel_core::types::{Alert, AlertType, ReturnSeries, Severity};

/// Generate a random daily return series in roughly [-5%, +5%].
fn generate_returns(len: usize) -> Vec<f64> {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen_range(-0.05..0.05)).collect()
}

const SERIES_LENGTHS: [usize; 4] = [10, 100, 1_000, 10_000];

/// Benchmark the tail risk measures.
fn bench_tail_risk(c: &mut Criterion) {
    let mut group = c.benchmark_group("tail_risk");

    for len in SERIES_LENGTHS.iter() {
        let returns = generate_returns(*len);

        group.throughput(Throughput::Elements(*len as u64));
        group.bench_with_input(BenchmarkId::new("var_95", len), &returns, |b, returns| {
            b.iter(|| black_box(value_at_risk(black_box(returns), 0.95)))
        });
        group.bench_with_input(
            BenchmarkId::new("expected_shortfall", len),
            &returns,
            |b, returns| b.iter(|| black_box(expected_shortfall(black_box(returns), 0.95))),
        );
    }

    group.finish();
}

/// Benchmark the risk-adjusted return ratios and drawdown.
fn bench_ratios(c: &mut Criterion) {
    let mut group = c.benchmark_group("ratios");

    for len in SERIES_LENGTHS.iter() {
        let returns = generate_returns(*len);

        group.throughput(Throughput::Elements(*len as u64));
        group.bench_with_input(BenchmarkId::new("sharpe", len), &returns, |b, returns| {
            b.iter(|| black_box(sharpe_ratio(black_box(returns), 0.0)))
        });
        group.bench_with_input(BenchmarkId::new("sortino", len), &returns, |b, returns| {
            b.iter(|| black_box(sortino_ratio(black_box(returns), 0.0)))
        });
        group.bench_with_input(BenchmarkId::new("max_drawdown", len), &returns, |b, returns| {
            b.iter(|| black_box(max_drawdown(black_box(returns))))
        });
    }

    group.finish();
}

/// Benchmark a full snapshot, as computed once per portfolio per cycle.
fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");

    for len in SERIES_LENGTHS.iter() {
        let series = ReturnSeries::new(generate_returns(*len));

        group.bench_with_input(BenchmarkId::new("compute", len), &series, |b, series| {
            b.iter(|| black_box(RiskMetricsSnapshot::compute("bench", black_box(series), 0.0)))
        });
    }

    group.finish();
}

/// Benchmark cooldown admission across many subjects.
fn bench_cooldown_gate(c: &mut Criterion) {
    let mut group = c.benchmark_group("cooldown");

    let gate = CooldownGate::new();
    let now = Utc::now();
    let alerts: Vec<Alert> = (0..1_000)
        .map(|i| Alert::new(AlertType::CpuUsage, format!("host-{i}"), Severity::Warning, "cpu"))
        .collect();

    // Populate so later admissions hit the suppression path.
    for alert in &alerts {
        gate.admit(alert, 300, now);
    }

    group.throughput(Throughput::Elements(1));
    group.bench_function("admit_suppressed", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % alerts.len();
            black_box(gate.admit(&alerts[i], 300, now))
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_tail_risk,
    bench_ratios,
    bench_snapshot,
    bench_cooldown_gate,
);

criterion_main!(benches);
