//! Property tests for range scans driven by mock probes

use async_trait::async_trait;
use portscope::{PortProbe, PortRange, RangeScanner, ScanConfig, ScanError};
use proptest::prelude::*;
use rand::Rng;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Answers from a fixed open set after a random delay
struct JitteryProbe {
    open: BTreeSet<u16>,
    max_delay_us: u64,
    calls: Arc<AtomicUsize>,
}

impl JitteryProbe {
    fn new(open: BTreeSet<u16>, max_delay_us: u64) -> Self {
        Self {
            open,
            max_delay_us,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl PortProbe for JitteryProbe {
    async fn probe(&self, _host: &str, port: u16, _timeout: Duration) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = rand::thread_rng().gen_range(0..=self.max_delay_us);
        tokio::time::sleep(Duration::from_micros(delay)).await;
        self.open.contains(&port)
    }
}

fn scanner(probe: JitteryProbe, concurrency: usize) -> RangeScanner<JitteryProbe> {
    RangeScanner::new(probe, ScanConfig::default().with_concurrency(concurrency)).unwrap()
}

/// A valid range plus a set of ports, some of them outside it
fn range_and_open_set() -> impl Strategy<Value = (u16, u16, BTreeSet<u16>)> {
    (0u16..=65_535, 0u16..120).prop_flat_map(|(start, width)| {
        let end = start.saturating_add(width);
        let lo = start.saturating_sub(5);
        let hi = end.saturating_add(5);
        (
            Just(start),
            Just(end),
            prop::collection::btree_set(lo..=hi, 0..20),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_scan_partitions_range((start, end, open) in range_and_open_set(), concurrency in 1usize..64) {
        let scanner = scanner(JitteryProbe::new(open.clone(), 300), concurrency);
        let summary = tokio_test::block_on(scanner.scan("mock", i64::from(start), i64::from(end))).unwrap();

        let expected_open: Vec<u16> = open.range(start..=end).copied().collect();
        let expected_closed: Vec<u16> = (start..=end).filter(|p| !open.contains(p)).collect();

        prop_assert_eq!(&summary.open_ports, &expected_open);
        prop_assert_eq!(&summary.closed_ports, &expected_closed);
        prop_assert_eq!(summary.total(), usize::from(end - start) + 1);
    }

    #[test]
    fn prop_invalid_ranges_never_probe(start in -70_000i64..70_000, end in -70_000i64..70_000) {
        prop_assume!(start < 0 || end > 65_535 || start > end);

        let probe = JitteryProbe::new(BTreeSet::new(), 0);
        let calls = probe.calls.clone();
        let scanner = scanner(probe, 8);

        let result = tokio_test::block_on(scanner.scan("mock", start, end));
        prop_assert!(matches!(result, Err(ScanError::RangeValidation(_))));
        prop_assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn prop_port_range_round_trips_display(start in 0u16..=65_535, width in 0u16..1000) {
        let end = start.saturating_add(width);
        let range = PortRange::new(i64::from(start), i64::from(end)).unwrap();

        prop_assert_eq!(range.to_string().parse::<PortRange>().unwrap(), range);
        prop_assert_eq!(range.iter().count(), range.len());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_results_independent_of_completion_order() {
    let open: BTreeSet<u16> = [22, 80].into_iter().collect();
    let first = scanner(JitteryProbe::new(open.clone(), 2_000), 16)
        .scan("mock", 1, 100)
        .await
        .unwrap();

    for _ in 0..5 {
        let again = scanner(JitteryProbe::new(open.clone(), 2_000), 16)
            .scan("mock", 1, 100)
            .await
            .unwrap();
        assert_eq!(again, first);
    }

    assert_eq!(first.open_ports, vec![22, 80]);
    assert_eq!(first.closed_ports.len(), 98);
    assert!(!first.closed_ports.contains(&22));
}

#[tokio::test]
async fn test_full_port_space_with_instant_probe() {
    let probe = JitteryProbe::new([0, 65_535].into_iter().collect(), 0);
    let calls = probe.calls.clone();
    let summary = scanner(probe, 1_000).scan("mock", 0, 65_535).await.unwrap();

    assert_eq!(summary.open_ports, vec![0, 65_535]);
    assert_eq!(summary.total(), 65_536);
    assert_eq!(calls.load(Ordering::SeqCst), 65_536);
}
