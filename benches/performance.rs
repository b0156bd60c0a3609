//! Performance benchmarks for the sweep harness hot paths
//!
//! None of these spawn processes or touch the network; they cover the pure
//! work done per trial and per configuration load.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use clap::Parser;
use netsweep::{
    cli::Cli,
    config::parser::ConfigParser,
    executor::classify::{classify_attempt, parse_transmission_time, sanitize, AttemptExit},
    models::{Config, ResultRecord, SweepGrid, TrialOutcome},
    output::format_row,
    shaping::ShapingConfig,
    types::{BandwidthSpec, DelaySpec, SizeSpec},
};

fn sample_grid(n: usize) -> SweepGrid {
    let delays: Vec<DelaySpec> = (0..n).map(|i| format!("{}ms", i * 10).parse().unwrap()).collect();
    let bandwidths: Vec<BandwidthSpec> = (1..=n).map(|i| format!("{}Mbps", i).parse().unwrap()).collect();
    let sizes: Vec<SizeSpec> = (1..=n).map(|i| format!("{}K", i * 10).parse().unwrap()).collect();
    SweepGrid::new(delays, bandwidths, sizes)
}

/// Benchmark token parsing and shaping derivation
fn benchmark_shaping_derivation(c: &mut Criterion) {
    let mut group = c.benchmark_group("shaping");

    let bandwidth: BandwidthSpec = "10Mbps".parse().unwrap();
    let delay: DelaySpec = "30ms".parse().unwrap();

    group.bench_function("derive", |b| {
        b.iter(|| ShapingConfig::derive(black_box(&bandwidth), black_box(&delay)))
    });

    group.bench_function("parse_tokens", |b| {
        b.iter(|| {
            let _: BandwidthSpec = black_box("500Kbps").parse().unwrap();
            let _: DelaySpec = black_box("100ms").parse().unwrap();
            let _: SizeSpec = black_box("1M").parse().unwrap();
        })
    });

    for size in [2usize, 5, 10].iter() {
        let grid = sample_grid(*size);
        group.bench_with_input(BenchmarkId::new("derive_grid", grid.len()), &grid, |b, grid| {
            b.iter(|| {
                grid.trials()
                    .map(|t| ShapingConfig::derive(t.bandwidth(), t.delay()).burst_kbit)
                    .sum::<u64>()
            })
        });
    }

    group.finish();
}

/// Benchmark client output classification
fn benchmark_classification(c: &mut Criterion) {
    let mut group = c.benchmark_group("classification");

    let success = "connecting...\nsending 10240 bytes\nTransmission took 42 ms\n";
    let noisy = "warning, retrying\r\n\"partial\" write\n".repeat(50);

    group.bench_function("parse_transmission_time", |b| {
        b.iter(|| parse_transmission_time(black_box(success)))
    });

    group.bench_function("classify_success", |b| {
        b.iter(|| classify_attempt(AttemptExit::Exited(0), black_box(success)))
    });

    group.bench_function("classify_failure", |b| {
        b.iter(|| classify_attempt(AttemptExit::Exited(2), black_box(&noisy)))
    });

    group.bench_function("sanitize", |b| b.iter(|| sanitize(black_box(&noisy))));

    group.finish();
}

/// Benchmark configuration loading and row rendering
fn benchmark_config_and_rows(c: &mut Criterion) {
    let mut group = c.benchmark_group("config");

    group.bench_function("parse_cli_args", |b| {
        b.iter(|| {
            Cli::parse_from(black_box([
                "netsweep",
                "--delays", "0ms,30ms",
                "--bandwidths", "1Mbps,10Mbps",
                "--sizes", "10K,1M",
                "--no-shaping",
            ]))
        })
    });

    group.bench_function("apply_overrides_and_validate", |b| {
        let parser = ConfigParser::new(Cli::parse_from(["netsweep", "--sizes", "10K,100K,1M"]));
        b.iter(|| {
            let mut config = Config::default();
            parser.apply_cli_overrides(&mut config);
            config.validate().unwrap();
        })
    });

    let grid = sample_grid(3);
    let trial = grid.trials().next().unwrap();
    let outcome = TrialOutcome::ProcessError {
        exit_code: 1,
        message: "connection refused".to_string(),
    };
    group.bench_function("format_row", |b| {
        b.iter(|| format_row(&ResultRecord::from_outcome(black_box(&trial), black_box(&outcome))))
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_shaping_derivation,
    benchmark_classification,
    benchmark_config_and_rows
);
criterion_main!(benches);
