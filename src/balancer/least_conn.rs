//! Least-connections selection, plain and weight-scaled.

use std::sync::Arc;

use rand::Rng;

use crate::balancer::backend::Backend;

/// Pick the backend with the fewest in-flight connections. Ties go to the
/// first observed minimum for stability.
pub(crate) fn select(eligible: &[&Arc<Backend>]) -> Option<Arc<Backend>> {
    eligible
        .iter()
        .min_by_key(|b| b.get_connections())
        .map(|b| Arc::clone(b))
}

/// Pick the backend with the lowest connections-per-weight score. Equal
/// scores are broken uniformly at random so equally loaded backends share
/// traffic instead of starving the later ones.
pub(crate) fn select_weighted(eligible: &[&Arc<Backend>]) -> Option<Arc<Backend>> {
    let mut best_score = f64::INFINITY;
    let mut best: Vec<&Arc<Backend>> = Vec::new();

    for &backend in eligible {
        let score = weighted_score(backend);
        if score < best_score {
            best_score = score;
            best.clear();
            best.push(backend);
        } else if score == best_score {
            best.push(backend);
        }
    }

    match best.len() {
        0 => None,
        1 => Some(best[0].clone()),
        n => {
            let index = rand::thread_rng().gen_range(0..n);
            Some(best[index].clone())
        }
    }
}

pub(crate) fn weighted_score(backend: &Backend) -> f64 {
    let weight = backend.weight().max(1);
    backend.get_connections() as f64 / f64::from(weight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balancer::backend::tests::test_backend;
    use crate::config::schema::BackendConfig;

    #[test]
    fn picks_fewest_connections() {
        let a = test_backend("a", 3001);
        let b = test_backend("b", 3002);
        a.inc_connections();

        let backends = vec![a.clone(), b.clone()];
        let eligible: Vec<_> = backends.iter().collect();
        assert_eq!(select(&eligible).unwrap().id, b.id);

        b.inc_connections();
        b.inc_connections();
        assert_eq!(select(&eligible).unwrap().id, a.id);
    }

    #[test]
    fn first_minimum_wins_ties() {
        let a = test_backend("a", 3001);
        let b = test_backend("b", 3002);
        let backends = vec![a.clone(), b];
        let eligible: Vec<_> = backends.iter().collect();

        for _ in 0..16 {
            assert_eq!(select(&eligible).unwrap().id, a.id);
        }
    }

    #[test]
    fn weight_scales_the_score() {
        let heavy = Arc::new(Backend::from_config(&BackendConfig {
            id: "heavy".to_string(),
            host: "127.0.0.1".to_string(),
            port: 3001,
            weight: 10,
            scheme: "http".to_string(),
            max_conn: 100,
            ..Default::default()
        }));
        let light = Arc::new(Backend::from_config(&BackendConfig {
            id: "light".to_string(),
            host: "127.0.0.1".to_string(),
            port: 3002,
            weight: 1,
            scheme: "http".to_string(),
            max_conn: 100,
            ..Default::default()
        }));

        // heavy: 5/10 = 0.5, light: 1/1 = 1.0, so heavy still wins.
        for _ in 0..5 {
            heavy.inc_connections();
        }
        light.inc_connections();

        let backends = vec![light, heavy.clone()];
        let eligible: Vec<_> = backends.iter().collect();
        for _ in 0..16 {
            assert_eq!(select_weighted(&eligible).unwrap().id, heavy.id);
        }
    }

    #[test]
    fn zero_weight_scores_as_one() {
        let backend = Arc::new(Backend::from_config(&BackendConfig {
            id: "z".to_string(),
            host: "127.0.0.1".to_string(),
            port: 3001,
            weight: 0,
            scheme: "http".to_string(),
            max_conn: 100,
            ..Default::default()
        }));
        backend.inc_connections();
        assert_eq!(weighted_score(&backend), 1.0);
    }

    #[test]
    fn equal_scores_spread_over_all_minima() {
        let a = test_backend("a", 3001);
        let b = test_backend("b", 3002);
        let loaded = test_backend("c", 3003);
        loaded.inc_connections();

        let backends = vec![a.clone(), b.clone(), loaded.clone()];
        let eligible: Vec<_> = backends.iter().collect();

        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            let picked = select_weighted(&eligible).unwrap();
            assert_ne!(picked.id, loaded.id);
            seen.insert(picked.id.clone());
        }
        assert_eq!(seen.len(), 2);
    }
}
