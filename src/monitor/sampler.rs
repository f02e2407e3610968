//! Asynchronous performance sampler.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;

use crate::balancer::backend::PerformanceSnapshot;
use crate::lifecycle::Watcher;

/// Cadence of the cheap metric refresh.
const SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// Cadence of pushing summaries to observers.
const REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Bounded report channel; a slow observer loses reports, the sampler
/// never waits.
const REPORT_BUFFER: usize = 100;

/// Lock-free request/connection accounting plus cached utilisation
/// figures refreshed by a background task.
///
/// The cached floats are proxies derived from the proxy's own load
/// (in-flight requests against the configured connection budget); a real
/// host collector replaces them through the admin report endpoint.
#[derive(Debug)]
pub struct PerformanceMonitor {
    total_requests: AtomicU64,
    active_connections: AtomicI64,
    total_bytes_sent: AtomicU64,
    total_bytes_recv: AtomicU64,

    // f64 bit patterns, written only by the sampler task.
    cpu_usage: AtomicU64,
    memory_usage: AtomicU64,
    load_avg: AtomicU64,

    /// Connection budget the utilisation proxies are scaled against.
    capacity: usize,

    report_tx: mpsc::Sender<PerformanceSnapshot>,
}

impl PerformanceMonitor {
    /// Build a monitor scaled to `capacity` concurrent connections.
    /// Returns the receiving end of the report channel for observers.
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<PerformanceSnapshot>) {
        let (report_tx, report_rx) = mpsc::channel(REPORT_BUFFER);
        let monitor = Arc::new(Self {
            total_requests: AtomicU64::new(0),
            active_connections: AtomicI64::new(0),
            total_bytes_sent: AtomicU64::new(0),
            total_bytes_recv: AtomicU64::new(0),
            cpu_usage: AtomicU64::new(0f64.to_bits()),
            memory_usage: AtomicU64::new(0f64.to_bits()),
            load_avg: AtomicU64::new(0f64.to_bits()),
            capacity: capacity.max(1),
            report_tx,
        });
        (monitor, report_rx)
    }

    /// Spawn the sampling and reporting loops.
    pub fn spawn(self: &Arc<Self>, mut shutdown: Watcher) {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut sample_tick = tokio::time::interval(SAMPLE_INTERVAL);
            let mut report_tick = tokio::time::interval(REPORT_INTERVAL);

            loop {
                tokio::select! {
                    _ = sample_tick.tick() => monitor.sample(),
                    _ = report_tick.tick() => monitor.report(),
                    _ = shutdown.triggered() => {
                        tracing::debug!("Performance sampler stopping");
                        break;
                    }
                }
            }
        });
    }

    /// Record a completed proxied request. Lock-free, never blocks.
    pub fn record_request(&self, bytes_sent: u64, bytes_recv: u64) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_bytes_sent.fetch_add(bytes_sent, Ordering::Relaxed);
        self.total_bytes_recv.fetch_add(bytes_recv, Ordering::Relaxed);
    }

    /// Track an in-flight connection; the guard ends it on drop.
    pub fn track(self: &Arc<Self>) -> ConnectionTrack {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        ConnectionTrack {
            monitor: self.clone(),
        }
    }

    pub fn active_connections(&self) -> i64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    /// Latest stats without blocking.
    pub fn server_stats(&self) -> PerformanceSnapshot {
        let load = f64::from_bits(self.load_avg.load(Ordering::Relaxed));
        PerformanceSnapshot {
            cpu_usage: f64::from_bits(self.cpu_usage.load(Ordering::Relaxed)),
            memory_usage: f64::from_bits(self.memory_usage.load(Ordering::Relaxed)),
            disk_usage: 0.0,
            load_avg_1: load,
            load_avg_5: load,
            load_avg_15: load,
            network_in: self.total_bytes_recv.load(Ordering::Relaxed) as f64 / 1024.0,
            network_out: self.total_bytes_sent.load(Ordering::Relaxed) as f64 / 1024.0,
            timestamp: unix_now(),
        }
    }

    /// Refresh the cached floats from the live counters.
    fn sample(&self) {
        let active = self.active_connections.load(Ordering::Relaxed).max(0) as f64;
        let saturation = (active / self.capacity as f64 * 100.0).min(100.0);

        self.cpu_usage.store(saturation.to_bits(), Ordering::Relaxed);
        self.memory_usage.store(saturation.to_bits(), Ordering::Relaxed);
        self.load_avg.store((active / 100.0).to_bits(), Ordering::Relaxed);
    }

    /// Push a summary to observers, dropping it when nobody keeps up.
    fn report(&self) {
        if let Err(mpsc::error::TrySendError::Full(_)) =
            self.report_tx.try_send(self.server_stats())
        {
            tracing::debug!("Performance report channel full, report dropped");
        }
    }
}

/// RAII guard for the active-connection gauge.
#[derive(Debug)]
pub struct ConnectionTrack {
    monitor: Arc<PerformanceMonitor>,
}

impl Drop for ConnectionTrack {
    fn drop(&mut self) {
        self.monitor
            .active_connections
            .fetch_sub(1, Ordering::Relaxed);
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
