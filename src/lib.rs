//! Flowgate reverse proxy library.

pub mod admin;
pub mod balancer;
pub mod config;
pub mod lifecycle;
pub mod monitor;
pub mod observability;
pub mod proxy;
pub mod routing;

pub use config::schema::Config;
pub use config::Manager as ConfigManager;
pub use lifecycle::Shutdown;
pub use proxy::ProxyServer;
