//! Observability subsystem.
//!
//! # Design Decisions
//! - Structured logging via tracing; level configurable through the
//!   environment with a sane default
//! - Metrics are cheap atomic increments behind the `metrics` facade,
//!   exported by an optional Prometheus listener
//! - Request IDs flow through log events on the dispatch path

pub mod logging;
pub mod metrics;
