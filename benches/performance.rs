//! Performance benchmarks for the portscope scanner

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use portscope::scanner::parse_range_fields;
use portscope::{PortProbe, PortRange, RangeScanner, ScanConfig};
use std::time::Duration;
use tokio::runtime::Runtime;

/// Answers immediately so only the engine's own overhead is measured
struct InstantProbe;

#[async_trait]
impl PortProbe for InstantProbe {
    async fn probe(&self, _host: &str, port: u16, _timeout: Duration) -> bool {
        port % 100 == 0
    }
}

/// Benchmark port parsing performance
fn bench_port_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("port_parsing");

    group.bench_function("parse_range_1-65535", |b| {
        b.iter(|| black_box("1-65535").parse::<PortRange>())
    });

    group.bench_function("parse_fields", |b| {
        b.iter(|| parse_range_fields(black_box(" 1 "), black_box(" 1024 ")))
    });

    group.finish();
}

/// Benchmark concurrent scanning
fn bench_concurrent_scan(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("concurrent_scan");
    group.sample_size(10); // Reduce sample size for expensive operations

    let range = PortRange::new(1, 10_000).unwrap();
    for concurrency in [10, 100, 500, 2000].iter() {
        let scanner =
            RangeScanner::new(InstantProbe, ScanConfig::default().with_concurrency(*concurrency))
                .unwrap();

        group.bench_with_input(
            BenchmarkId::new("mock_scan_10k", concurrency),
            concurrency,
            |b, _| b.iter(|| rt.block_on(scanner.scan_range("bench", black_box(range)))),
        );
    }

    group.finish();
}

/// Benchmark a real connect scan against loopback
fn bench_loopback_scan(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("loopback_scan");
    group.sample_size(10);

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let start = port.saturating_sub(50);
    let range = PortRange::new(i64::from(start), (i64::from(start) + 100).min(65_535)).unwrap();
    let scanner = RangeScanner::with_defaults();

    group.bench_function("connect_around_listener", |b| {
        b.iter(|| rt.block_on(scanner.scan_range("127.0.0.1", range)))
    });

    group.finish();
    drop(listener);
}

criterion_group!(benches, bench_port_parsing, bench_concurrent_scan, bench_loopback_scan);

criterion_main!(benches);
