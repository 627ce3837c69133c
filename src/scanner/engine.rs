//! Main scanning engine implementation

use crate::config::ScanConfig;
use crate::network::{PortProbe, TcpConnectProbe};
use crate::scanner::range::parse_range_fields;
use crate::scanner::{partition, PartialScan, PortRange, ProbeResult, ScanSummary};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;

/// Probes every port of an inclusive range with bounded fan-out
///
/// The scanner holds only its probe and configuration, so one instance can
/// serve any number of independent scans.
pub struct RangeScanner<P: PortProbe + 'static = TcpConnectProbe> {
    probe: Arc<P>,
    config: ScanConfig,
}

impl RangeScanner<TcpConnectProbe> {
    /// TCP connect probing with a one second timeout
    pub fn with_defaults() -> Self {
        Self {
            probe: Arc::new(TcpConnectProbe::new()),
            config: ScanConfig::default(),
        }
    }
}

impl<P: PortProbe + 'static> RangeScanner<P> {
    /// Create a new scanner with the given probe and configuration
    pub fn new(probe: P, config: ScanConfig) -> crate::Result<Self> {
        config.validate()?;

        Ok(Self {
            probe: Arc::new(probe),
            config,
        })
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Validate `start..=end` and scan it
    ///
    /// Nothing is probed unless the range is valid.
    pub async fn scan(&self, host: &str, start: i64, end: i64) -> crate::Result<ScanSummary> {
        let range = PortRange::new(start, end)?;
        Ok(self.scan_range(host, range).await)
    }

    /// Scan straight from the text of the input fields
    pub async fn scan_input(
        &self,
        host: &str,
        start: &str,
        end: &str,
    ) -> crate::Result<ScanSummary> {
        let range = parse_range_fields(start, end)?;
        Ok(self.scan_range(host.trim(), range).await)
    }

    /// Probe every port in `range` and wait for all of them
    pub async fn scan_range(&self, host: &str, range: PortRange) -> ScanSummary {
        self.run(host, range, None).await.summary
    }

    /// Like [`scan_range`](Self::scan_range) but gives up after `deadline`
    ///
    /// Probes still running at expiry are aborted and their sockets closed.
    /// Their ports, and any never started, are listed in
    /// [`PartialScan::unprobed`].
    pub async fn scan_with_deadline(
        &self,
        host: &str,
        range: PortRange,
        deadline: Duration,
    ) -> PartialScan {
        self.run(host, range, Some(Instant::now() + deadline)).await
    }

    /// Stream results in completion order
    ///
    /// Must be called from within a tokio runtime. The receiver yields each
    /// port exactly once and closes after the last probe. Dropping it stops
    /// further probes from being started.
    pub fn scan_streaming(&self, host: &str, range: PortRange) -> mpsc::Receiver<ProbeResult> {
        let (tx, rx) = mpsc::channel(self.channel_capacity(range));
        tokio::spawn(dispatch(
            self.probe.clone(),
            Arc::from(host),
            range,
            self.config.timeout_duration(),
            self.config.concurrency,
            tx,
        ));
        rx
    }

    fn channel_capacity(&self, range: PortRange) -> usize {
        self.config.concurrency.min(range.len())
    }

    async fn run(&self, host: &str, range: PortRange, deadline: Option<Instant>) -> PartialScan {
        let started = Instant::now();
        log::debug!(
            "Scanning {} ports {} (concurrency {}, timeout {:?})",
            host,
            range,
            self.config.concurrency,
            self.config.timeout_duration()
        );

        let (tx, mut rx) = mpsc::channel(self.channel_capacity(range));
        let dispatcher = tokio::spawn(dispatch(
            self.probe.clone(),
            Arc::from(host),
            range,
            self.config.timeout_duration(),
            self.config.concurrency,
            tx,
        ));

        // One slot per port; this loop is the only writer.
        let mut slots: Vec<Option<bool>> = vec![None; range.len()];
        let mut remaining = range.len();

        while remaining > 0 {
            let next = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, rx.recv()).await {
                    Ok(next) => next,
                    Err(_elapsed) => {
                        log::warn!(
                            "Scan of {} hit its deadline with {} of {} ports unprobed",
                            host,
                            remaining,
                            range.len()
                        );
                        break;
                    }
                },
                None => rx.recv().await,
            };

            let Some(result) = next else {
                break;
            };

            let slot = &mut slots[range.offset(result.port)];
            if slot.is_none() {
                remaining -= 1;
            }
            *slot = Some(result.reachable);
            log::trace!("{}:{} {}", host, result.port, result.state());
        }

        // Dropping the dispatcher drops its JoinSet, which aborts any probe
        // still in flight.
        dispatcher.abort();

        if deadline.is_none() && remaining > 0 {
            log::error!(
                "{} probe tasks of {} ended without reporting; counting them as closed",
                remaining,
                host
            );
            for slot in slots.iter_mut().filter(|slot| slot.is_none()) {
                *slot = Some(false);
            }
        }

        let scan = partition(range, &slots);
        log::debug!(
            "Scanned {} ports of {} in {:?}: {} open, {} closed, {} unprobed",
            range.len(),
            host,
            started.elapsed(),
            scan.summary.open_count(),
            scan.summary.closed_count(),
            scan.unprobed.len()
        );
        scan
    }
}

/// Spawn one probe task per port, never more than `concurrency` at once
async fn dispatch<P: PortProbe + 'static>(
    probe: Arc<P>,
    host: Arc<str>,
    range: PortRange,
    timeout: Duration,
    concurrency: usize,
    tx: mpsc::Sender<ProbeResult>,
) {
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut probes = JoinSet::new();

    for port in range {
        if tx.is_closed() {
            break;
        }

        // The semaphore is never closed.
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        let probe = probe.clone();
        let host = host.clone();
        let tx = tx.clone();

        probes.spawn(async move {
            let _permit = permit; // Keep permit alive
            let reachable = probe.probe(&host, port, timeout).await;
            let _ = tx.send(ProbeResult { port, reachable }).await;
        });

        while let Some(finished) = probes.try_join_next() {
            log_join_failure(finished);
        }
    }

    while let Some(finished) = probes.join_next().await {
        log_join_failure(finished);
    }
}

fn log_join_failure(finished: Result<(), tokio::task::JoinError>) {
    if let Err(e) = finished {
        if e.is_panic() {
            log::error!("Probe task panicked: {}", e);
        }
    }
}
