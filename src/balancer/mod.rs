//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Route matched → upstream resolved
//!     → upstream.rs (live backend snapshot)
//!     → mod.rs (eligibility filter: active ∧ ¬draining ∧ ¬at-limit)
//!     → Apply the selection policy:
//!         - ip_hash.rs (FNV-1a over the client IP)
//!         - least_conn.rs (fewest connections, plain or weighted)
//!         - weighted.rs (accumulating-weight walk)
//!         - performance.rs (connections + reported utilisation)
//!     → backend.rs (acquire connection guard)
//!     → Return backend or a selection error
//! ```
//!
//! # Design Decisions
//! - The policy set is closed: a tagged enum plus one dispatch function,
//!   not a plugin registry
//! - Policies are pure over the candidate slice; the only shared state is
//!   the weighted cursor, owned by the Balancer
//! - Selection never mutates backend state beyond the atomic reads

pub mod backend;
pub mod ip_hash;
pub mod least_conn;
pub mod performance;
pub mod upstream;
pub mod weighted;

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use backend::Backend;

/// The closed set of selection policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PolicyKind {
    IpHash,
    LeastConnections,
    #[default]
    LeastConnectionsWeight,
    Weight,
    PerformanceLcw,
}

impl PolicyKind {
    /// Resolve a config identifier. Unknown identifiers return None so the
    /// caller can substitute the default.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ip_hash" => Some(Self::IpHash),
            "least_connections" => Some(Self::LeastConnections),
            "least_connections_weight" => Some(Self::LeastConnectionsWeight),
            "weight" => Some(Self::Weight),
            "performance_least_connections_weight" => Some(Self::PerformanceLcw),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IpHash => "ip_hash",
            Self::LeastConnections => "least_connections",
            Self::LeastConnectionsWeight => "least_connections_weight",
            Self::Weight => "weight",
            Self::PerformanceLcw => "performance_least_connections_weight",
        }
    }
}

/// The slice of request state selection may depend on.
#[derive(Debug, Default)]
pub struct RequestInfo<'a> {
    /// Resolved client IP, if obtainable.
    pub client_ip: Option<&'a str>,
}

/// Why no backend could be selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionError {
    /// No backend is active and undrained.
    NoLiveBackends,
    /// Live backends exist but every one is at its connection limit.
    AllAtConnectionLimit,
}

/// Stateful front of the policy table. One instance is shared by all
/// dispatchers; the weighted cursor is its only mutable state.
#[derive(Debug, Default)]
pub struct Balancer {
    weight_cursor: AtomicU64,
}

impl Balancer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the eligibility filter, then the policy.
    pub fn select(
        &self,
        policy: PolicyKind,
        candidates: &[Arc<Backend>],
        request: &RequestInfo<'_>,
    ) -> Result<Arc<Backend>, SelectionError> {
        let eligible: Vec<&Arc<Backend>> = candidates
            .iter()
            .filter(|b| b.is_active() && !b.is_draining() && !b.at_connection_limit())
            .collect();

        if eligible.is_empty() {
            let any_live = candidates
                .iter()
                .any(|b| b.is_active() && !b.is_draining());
            return Err(if any_live {
                SelectionError::AllAtConnectionLimit
            } else {
                SelectionError::NoLiveBackends
            });
        }

        let selected = match policy {
            PolicyKind::IpHash => ip_hash::select(&eligible, request.client_ip),
            PolicyKind::LeastConnections => least_conn::select(&eligible),
            PolicyKind::LeastConnectionsWeight => least_conn::select_weighted(&eligible),
            PolicyKind::Weight => weighted::select(&eligible, &self.weight_cursor),
            PolicyKind::PerformanceLcw => performance::select(&eligible),
        };

        selected.ok_or(SelectionError::NoLiveBackends)
    }
}
