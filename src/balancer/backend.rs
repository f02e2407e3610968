//! Backend entity.
//!
//! # Responsibilities
//! - Represent a single upstream endpoint
//! - Track in-flight connections for selection and limit enforcement
//! - Carry the drain/active flags the control plane toggles
//! - Publish performance snapshots for the performance-aware policy
//!
//! # Design Decisions
//! - Every mutable scalar is an atomic; no lock on the request path
//! - The decrement uses a CAS loop with a floor at zero, so the gauge
//!   never goes negative under racing decrements
//! - The connection limit is soft: selection is not serialised with the
//!   increment, so the gauge may transiently exceed max_conn by the
//!   number of concurrent selectors
//! - Snapshots are replaced whole via pointer swap, never mutated

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};

use crate::config::schema::BackendConfig;

/// A point-in-time view of a backend host's resource usage.
///
/// Reported by the backend itself through the admin API, or produced by
/// the local sampler for the proxy process.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PerformanceSnapshot {
    /// CPU usage, 0-100.
    pub cpu_usage: f64,
    /// Memory usage, 0-100.
    pub memory_usage: f64,
    /// Disk usage, 0-100.
    pub disk_usage: f64,
    pub load_avg_1: f64,
    pub load_avg_5: f64,
    pub load_avg_15: f64,
    /// Inbound traffic, KB/s.
    pub network_in: f64,
    /// Outbound traffic, KB/s.
    pub network_out: f64,
    /// Unix timestamp of the observation.
    pub timestamp: i64,
}

/// A single upstream endpoint.
///
/// Identity (`id`, address, scheme) is immutable; everything the control
/// plane or dispatcher mutates is atomic.
#[derive(Debug)]
pub struct Backend {
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub scheme: String,
    /// Pre-computed "host:port" for outbound URI building.
    pub authority: String,

    weight: AtomicU32,
    max_conn: AtomicI64,
    connections: AtomicI64,
    active: AtomicBool,
    draining: AtomicBool,
    performance: ArcSwapOption<PerformanceSnapshot>,
}

impl PartialEq for Backend {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Backend {
    pub fn from_config(config: &BackendConfig) -> Self {
        Self {
            id: config.id.clone(),
            name: config.name.clone(),
            host: config.host.clone(),
            port: config.port,
            scheme: config.scheme.clone(),
            authority: format!("{}:{}", config.host, config.port),
            weight: AtomicU32::new(config.weight),
            max_conn: AtomicI64::new(config.max_conn),
            connections: AtomicI64::new(0),
            active: AtomicBool::new(config.active),
            draining: AtomicBool::new(false),
            performance: ArcSwapOption::from(None),
        }
    }

    /// Whether this backend still describes the same endpoint as `config`.
    /// Matching backends keep their runtime state across config reloads.
    pub fn same_endpoint(&self, config: &BackendConfig) -> bool {
        self.id == config.id
            && self.host == config.host
            && self.port == config.port
            && self.scheme == config.scheme
    }

    /// Re-apply the tunable settings from a reloaded config.
    pub fn apply_settings(&self, config: &BackendConfig) {
        self.weight.store(config.weight, Ordering::Relaxed);
        self.max_conn.store(config.max_conn, Ordering::Relaxed);
        self.active.store(config.active, Ordering::Relaxed);
    }

    pub fn get_connections(&self) -> i64 {
        self.connections.load(Ordering::Relaxed)
    }

    pub fn inc_connections(&self) {
        self.connections.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrement the gauge, saturating at zero.
    pub fn dec_connections(&self) {
        let _ = self
            .connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                if n > 0 {
                    Some(n - 1)
                } else {
                    None
                }
            });
    }

    pub fn weight(&self) -> u32 {
        self.weight.load(Ordering::Relaxed)
    }

    pub fn max_conn(&self) -> i64 {
        self.max_conn.load(Ordering::Relaxed)
    }

    pub fn set_max_conn(&self, max_conn: i64) {
        self.max_conn.store(max_conn, Ordering::Relaxed);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Relaxed);
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Relaxed)
    }

    pub fn mark_draining(&self) {
        self.draining.store(true, Ordering::Relaxed);
    }

    pub fn clear_draining(&self) {
        self.draining.store(false, Ordering::Relaxed);
    }

    /// Best-effort limit check; not serialised with inc/dec.
    pub fn at_connection_limit(&self) -> bool {
        let max = self.max_conn();
        max > 0 && self.get_connections() >= max
    }

    /// Publish a new performance snapshot. Readers see the old or the new
    /// snapshot whole, never a tear.
    pub fn update_performance(&self, snapshot: PerformanceSnapshot) {
        self.performance.store(Some(Arc::new(snapshot)));
    }

    pub fn performance(&self) -> Option<Arc<PerformanceSnapshot>> {
        self.performance.load_full()
    }

    /// Combined resource utilisation in [0, 1]; 0 without a snapshot.
    pub fn utilization(&self) -> f64 {
        let Some(perf) = self.performance() else {
            return 0.0;
        };

        let utilization = (perf.cpu_usage / 100.0) * 0.4
            + (perf.memory_usage / 100.0) * 0.4
            + (perf.load_avg_1 / 100.0) * 0.2;

        utilization.min(1.0)
    }

    /// Increment the gauge and return a guard that decrements on drop,
    /// so accounting balances on every exit path.
    pub fn acquire(self: &Arc<Self>) -> ConnectionGuard {
        self.inc_connections();
        ConnectionGuard {
            backend: self.clone(),
        }
    }

    /// Serialised view for the admin API, derived from the atomics.
    pub fn view(&self) -> BackendView {
        BackendView {
            id: self.id.clone(),
            name: self.name.clone(),
            host: self.host.clone(),
            port: self.port,
            scheme: self.scheme.clone(),
            weight: self.weight(),
            max_conn: self.max_conn(),
            connections: self.get_connections(),
            active: self.is_active(),
            draining: self.is_draining(),
            performance: self.performance().map(|p| (*p).clone()),
        }
    }
}

/// Snapshot of a backend's state for the admin API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendView {
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub scheme: String,
    pub weight: u32,
    pub max_conn: i64,
    pub connections: i64,
    pub active: bool,
    pub draining: bool,
    pub performance: Option<PerformanceSnapshot>,
}

/// RAII guard pairing one increment with exactly one decrement.
#[derive(Debug)]
pub struct ConnectionGuard {
    backend: Arc<Backend>,
}

impl ConnectionGuard {
    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }
}

impl std::ops::Deref for ConnectionGuard {
    type Target = Backend;

    fn deref(&self) -> &Self::Target {
        &self.backend
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.backend.dec_connections();
    }
}
