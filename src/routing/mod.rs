//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → router.rs (longest-prefix scan over compiled rules)
//!     → matched rule, or the rule named "default", or no match
//!
//! Rule compilation (at startup and on every config swap):
//!     RoutingRule map
//!     → resolve policy identifiers (unknown → least_connections_weight)
//!     → sort by prefix length, longest first
//!     → freeze as an immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Rules compiled once per config publish, immutable at runtime
//! - No regex in the hot path, prefix matching only
//! - Deterministic: longest prefix wins, name order breaks ties

pub mod router;

pub use router::{CompiledRule, RouteTable};
