//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → schema.rs (defaulting)
//!     → validation.rs (semantic checks)
//!     → Config (validated, immutable)
//!     → manager.rs (ArcSwap snapshot, shared with all subsystems)
//!
//! On admin update:
//!     manager.update()
//!     → validation.rs validates
//!     → loader.rs persists to the original path
//!     → atomic swap of Arc<Config>
//!     → watcher channels notified (non-blocking, drop on full)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once published; changes require a full replace
//! - Defaulting touches only zero/empty fields, so explicit settings win
//! - Validation separates syntactic (serde) from semantic checks
//! - Watcher delivery never blocks the updater

pub mod loader;
pub mod manager;
pub mod schema;
pub mod validation;

pub use loader::ConfigError;
pub use manager::Manager;
pub use schema::{BackendConfig, Config, ProtocolTag, RoutingRule, ServerConfig};
