//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! signals.rs: SIGTERM / SIGINT → shutdown.trigger()
//! shutdown.rs: watch flag → proxy drain, admin stop, sampler stop
//! ```
//!
//! # Design Decisions
//! - Shutdown is a level-triggered flag, so tasks spawned after the
//!   signal still observe it
//! - The proxy stops accepting first, then drains in-flight dispatches

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, Watcher};
