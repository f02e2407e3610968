//! Weighted selection.
//!
//! Walks the eligible set accumulating weights and picks the first backend
//! whose running sum exceeds a cursor position. The cursor is a shared
//! monotone counter taken modulo the total weight, which yields the
//! configured ratios exactly over a full cycle of the same eligible set.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::balancer::backend::Backend;

pub(crate) fn select(eligible: &[&Arc<Backend>], cursor: &AtomicU64) -> Option<Arc<Backend>> {
    let total_weight: u64 = eligible.iter().map(|b| u64::from(b.weight())).sum();
    if total_weight == 0 {
        // Every eligible backend carries weight 0: none may take
        // weighted traffic.
        return None;
    }

    let position = cursor.fetch_add(1, Ordering::Relaxed) % total_weight;

    let mut running = 0u64;
    for backend in eligible {
        running += u64::from(backend.weight());
        if position < running {
            return Some(Arc::clone(backend));
        }
    }

    // Unreachable with position < total_weight; keep the walk total.
    eligible.first().map(|b| Arc::clone(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::balancer::backend::tests::test_backend;
    use crate::config::schema::BackendConfig;

    fn weighted_backend(id: &str, port: u16, weight: u32) -> Arc<Backend> {
        Arc::new(Backend::from_config(&BackendConfig {
            id: id.to_string(),
            host: "127.0.0.1".to_string(),
            port,
            weight,
            scheme: "http".to_string(),
            max_conn: 1_000_000,
            ..Default::default()
        }))
    }

    #[test]
    fn distribution_tracks_configured_ratios() {
        let backends = vec![
            weighted_backend("a", 3001, 1),
            weighted_backend("b", 3002, 2),
            weighted_backend("c", 3003, 3),
        ];
        let eligible: Vec<_> = backends.iter().collect();
        let cursor = AtomicU64::new(0);

        let mut hits: HashMap<String, u64> = HashMap::new();
        for _ in 0..6_000 {
            let picked = select(&eligible, &cursor).unwrap();
            *hits.entry(picked.id.clone()).or_default() += 1;
        }

        assert_eq!(hits["a"], 1_000);
        assert_eq!(hits["b"], 2_000);
        assert_eq!(hits["c"], 3_000);
    }

    #[test]
    fn cursor_is_monotone_over_a_stable_set() {
        let backends = vec![weighted_backend("a", 3001, 1), weighted_backend("b", 3002, 1)];
        let eligible: Vec<_> = backends.iter().collect();
        let cursor = AtomicU64::new(0);

        let order: Vec<String> = (0..4)
            .map(|_| select(&eligible, &cursor).unwrap().id.clone())
            .collect();
        assert_eq!(order, ["a", "b", "a", "b"]);
    }

    #[test]
    fn zero_weight_backend_is_skipped() {
        let zero = weighted_backend("zero", 3001, 0);
        let live = weighted_backend("live", 3002, 5);
        let backends = vec![zero, live.clone()];
        let eligible: Vec<_> = backends.iter().collect();
        let cursor = AtomicU64::new(0);

        for _ in 0..32 {
            assert_eq!(select(&eligible, &cursor).unwrap().id, live.id);
        }
    }

    #[test]
    fn all_zero_weights_select_nothing() {
        let backends = vec![weighted_backend("a", 3001, 0), weighted_backend("b", 3002, 0)];
        let eligible: Vec<_> = backends.iter().collect();
        let cursor = AtomicU64::new(0);

        assert!(select(&eligible, &cursor).is_none());
    }

    #[test]
    fn default_weight_splits_evenly() {
        let backends = vec![test_backend("a", 3001), test_backend("b", 3002)];
        let eligible: Vec<_> = backends.iter().collect();
        let cursor = AtomicU64::new(0);

        let mut hits: HashMap<String, u64> = HashMap::new();
        for _ in 0..400 {
            let picked = select(&eligible, &cursor).unwrap();
            *hits.entry(picked.id.clone()).or_default() += 1;
        }
        assert_eq!(hits["a"], 200);
        assert_eq!(hits["b"], 200);
    }
}
