//! Host-level network byte counters and their periodic poller
//!
//! The poller is independent of the scanner: it owns its counter source,
//! runs on its own task and publishes the latest reading through a `watch`
//! channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use sysinfo::Networks;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::ScanError;

const BYTES_PER_MEGABYTE: f64 = 1024.0 * 1024.0;

/// Cumulative bytes moved by the host since boot, summed over all interfaces
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficCounters {
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl TrafficCounters {
    pub fn sent_megabytes(&self) -> f64 {
        self.bytes_sent as f64 / BYTES_PER_MEGABYTE
    }

    pub fn received_megabytes(&self) -> f64 {
        self.bytes_received as f64 / BYTES_PER_MEGABYTE
    }
}

/// Anything that can report the host's byte counters
pub trait CounterSource: Send + 'static {
    fn read_counters(&mut self) -> crate::Result<TrafficCounters>;
}

/// Counter source backed by the operating system
pub struct SystemCounters {
    networks: Networks,
}

impl SystemCounters {
    pub fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
        }
    }
}

impl Default for SystemCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterSource for SystemCounters {
    fn read_counters(&mut self) -> crate::Result<TrafficCounters> {
        self.networks.refresh();

        let mut counters = TrafficCounters::default();
        let mut interfaces = 0usize;
        for (_name, data) in &self.networks {
            counters.bytes_sent = counters.bytes_sent.saturating_add(data.total_transmitted());
            counters.bytes_received = counters.bytes_received.saturating_add(data.total_received());
            interfaces += 1;
        }

        if interfaces == 0 {
            return Err(ScanError::Counters("no network interfaces found".to_string()));
        }
        Ok(counters)
    }
}

/// One reading of the counters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrafficSample {
    pub counters: TrafficCounters,
    pub taken_at: DateTime<Utc>,
}

/// Periodic poller for a [`CounterSource`]
pub struct TrafficMonitor {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
    samples: watch::Receiver<Option<TrafficSample>>,
}

impl TrafficMonitor {
    /// Start polling `source` every `interval`; the first read happens immediately
    pub fn spawn<S: CounterSource>(mut source: S, interval: Duration) -> Self {
        let (tx, rx) = watch::channel(None);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => match source.read_counters() {
                        Ok(counters) => {
                            let sample = TrafficSample { counters, taken_at: Utc::now() };
                            if tx.send(Some(sample)).is_err() {
                                break;
                            }
                        }
                        Err(e) => log::warn!("Failed to read traffic counters: {}", e),
                    },
                }
            }
        });

        Self {
            handle,
            cancel,
            samples: rx,
        }
    }

    /// Most recent sample, if any read has succeeded yet
    pub fn latest(&self) -> Option<TrafficSample> {
        *self.samples.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<TrafficSample>> {
        self.samples.clone()
    }

    /// Stop polling and wait for the task to exit
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            log::warn!("Traffic monitor task ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct SteppingCounters {
        step: u64,
    }

    impl CounterSource for SteppingCounters {
        fn read_counters(&mut self) -> crate::Result<TrafficCounters> {
            self.step += 1;
            Ok(TrafficCounters {
                bytes_sent: self.step * 1024,
                bytes_received: self.step * 2048,
            })
        }
    }

    struct BrokenCounters {
        reads: Arc<AtomicUsize>,
    }

    impl CounterSource for BrokenCounters {
        fn read_counters(&mut self) -> crate::Result<TrafficCounters> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Err(ScanError::Counters("unplugged".to_string()))
        }
    }

    #[test]
    fn test_megabyte_conversion() {
        let counters = TrafficCounters {
            bytes_sent: 3 * 1024 * 1024,
            bytes_received: 512 * 1024,
        };
        assert_eq!(counters.sent_megabytes(), 3.0);
        assert_eq!(counters.received_megabytes(), 0.5);
    }

    #[tokio::test]
    async fn test_monitor_publishes_samples() {
        let monitor = TrafficMonitor::spawn(SteppingCounters { step: 0 }, Duration::from_millis(10));
        let mut rx = monitor.subscribe();

        rx.changed().await.unwrap();
        rx.changed().await.unwrap();

        let latest = monitor.latest().expect("a sample after two updates");
        assert!(latest.counters.bytes_sent >= 2 * 1024);
        assert_eq!(latest.counters.bytes_received, latest.counters.bytes_sent * 2);

        monitor.stop().await;
    }

    #[tokio::test]
    async fn test_monitor_survives_read_failures() {
        let reads = Arc::new(AtomicUsize::new(0));
        let monitor = TrafficMonitor::spawn(
            BrokenCounters { reads: reads.clone() },
            Duration::from_millis(5),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(reads.load(Ordering::SeqCst) >= 2);
        assert!(monitor.latest().is_none());

        monitor.stop().await;
    }

    #[test]
    fn test_system_counters_read() {
        // Containers without interfaces report an error instead of zeros.
        match SystemCounters::new().read_counters() {
            Ok(_) | Err(ScanError::Counters(_)) => {}
            Err(other) => panic!("unexpected error: {}", other),
        }
    }
}
