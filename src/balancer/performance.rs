//! Performance-aware selection.
//!
//! Scores each backend as a blend of its connections-per-weight load and
//! the resource utilisation it last reported, then picks the minimum.
//! Backends that never reported score as idle, which biases traffic
//! toward them until a report arrives.

use std::sync::Arc;

use crate::balancer::backend::Backend;
use crate::balancer::least_conn;

const CONNECTION_SHARE: f64 = 0.7;
const UTILIZATION_SHARE: f64 = 0.3;

pub(crate) fn select(eligible: &[&Arc<Backend>]) -> Option<Arc<Backend>> {
    let mut best: Option<&Arc<Backend>> = None;
    let mut best_score = f64::INFINITY;

    for &backend in eligible {
        let candidate_score = score(backend);
        if candidate_score < best_score {
            best_score = candidate_score;
            best = Some(backend);
        }
    }

    best.map(|b| Arc::clone(b))
}

/// `0.7 · (connections / weight) + 0.3 · (utilisation · 100)`; lower wins.
pub(crate) fn score(backend: &Backend) -> f64 {
    let connection_score = least_conn::weighted_score(backend);
    let performance_score = backend.utilization() * 100.0;
    connection_score * CONNECTION_SHARE + performance_score * UTILIZATION_SHARE
}
