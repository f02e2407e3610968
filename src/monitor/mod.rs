//! Performance monitoring subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatch path (lock-free counters):
//!     track() / record_request()
//!     → atomic gauges and totals
//!
//! Sampler task (sampler.rs):
//!     100ms sample tick → refresh cached utilisation floats
//!     5s report tick    → push a snapshot into a bounded channel
//!                         (drop on full, never blocks)
//!
//! Readers:
//!     performance policy, admin stats endpoint → latest floats,
//!     without blocking the sampler or each other
//! ```
//!
//! # Design Decisions
//! - The sampler is the only writer of the cached floats
//! - Utilisation figures are proxies derived from the proxy's own
//!   counters; real host metrics come from an external collector
//!   reporting through the admin API

pub mod sampler;

pub use sampler::{ConnectionTrack, PerformanceMonitor};
