//! Upstream groups and the registry snapshot.
//!
//! # Design Decisions
//! - The registry is immutable once published; a config reload builds a
//!   new one and swaps it whole. In-flight dispatches keep the previous
//!   snapshot alive through their Arc until they return.
//! - Backends are owned by their upstream; a rebuild carries matching
//!   backends over by identity so their connection gauges survive.

use std::collections::HashMap;
use std::sync::Arc;

use crate::balancer::backend::Backend;
use crate::config::schema::Config;

/// A named, ordered group of interchangeable backends.
#[derive(Debug)]
pub struct Upstream {
    pub name: String,
    backends: Vec<Arc<Backend>>,
}

impl Upstream {
    pub fn new(name: String, backends: Vec<Arc<Backend>>) -> Self {
        Self { name, backends }
    }

    /// All backends, regardless of state.
    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    /// Backends whose active flag is set at the moment of iteration.
    /// Drain and limit filtering is the balancer's job.
    pub fn live_backends(&self) -> Vec<Arc<Backend>> {
        self.backends
            .iter()
            .filter(|b| b.is_active())
            .cloned()
            .collect()
    }

    pub fn find(&self, backend_id: &str) -> Option<&Arc<Backend>> {
        self.backends.iter().find(|b| b.id == backend_id)
    }
}

/// The full name -> upstream map, published as one snapshot.
#[derive(Debug, Default)]
pub struct Registry {
    upstreams: HashMap<String, Arc<Upstream>>,
}

impl Registry {
    /// Build a registry from a config, carrying runtime state over from
    /// `previous` for backends that describe the same endpoint.
    pub fn from_config(config: &Config, previous: Option<&Registry>) -> Self {
        let mut upstreams = HashMap::with_capacity(config.backends.len());

        for (name, backend_configs) in &config.backends {
            let prior = previous.and_then(|r| r.get(name));
            let mut backends = Vec::with_capacity(backend_configs.len());

            for backend_config in backend_configs {
                let carried = prior
                    .as_ref()
                    .and_then(|u| u.find(&backend_config.id))
                    .filter(|b| b.same_endpoint(backend_config));

                let backend = match carried {
                    Some(existing) => {
                        existing.apply_settings(backend_config);
                        existing.clone()
                    }
                    None => Arc::new(Backend::from_config(backend_config)),
                };
                backends.push(backend);
            }

            upstreams.insert(name.clone(), Arc::new(Upstream::new(name.clone(), backends)));
        }

        Self { upstreams }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Upstream>> {
        self.upstreams.get(name).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<Upstream>)> {
        self.upstreams.iter()
    }

    pub fn len(&self) -> usize {
        self.upstreams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upstreams.is_empty()
    }
}
