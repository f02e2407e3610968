//! Administrative control plane.
//!
//! # Responsibilities
//! - Expose config get/update and SSL material verification
//! - Expose backend listing, limit updates, drain requests
//! - Expose sampler stats and accept performance reports
//!
//! # Design Decisions
//! - Reads serve from the same dispatch snapshot the proxy uses
//! - Mutations touch backend atomics only; the next selection observes
//!   them, in-flight requests are never interrupted
//! - Drain and performance-report side effects run after the response
//!   is sent; callers must observe backend state, not assume it

pub mod handlers;

use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::{
    routing::{get, post, put},
    Router,
};
use tokio::net::TcpListener;

use crate::config::Manager as ConfigManager;
use crate::lifecycle::Watcher;
use crate::monitor::PerformanceMonitor;
use crate::proxy::DispatchState;

use self::handlers::*;

/// Shared state for the admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub config: Arc<ConfigManager>,
    pub dispatch: Arc<ArcSwap<DispatchState>>,
    pub monitor: Arc<PerformanceMonitor>,
}

/// Build the admin API router.
pub fn admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/api/v1/config", get(get_config).put(update_config))
        .route("/api/v1/config/reload-ssl", post(reload_ssl))
        .route("/api/v1/backends", get(list_backends))
        .route("/api/v1/backends/update", put(update_backend))
        .route("/api/v1/backends/disconnect", post(disconnect_backend))
        .route("/api/v1/stats/server", get(server_stats))
        .route("/api/v1/stats/backend", get(backend_stats))
        .route("/api/v1/report", post(report_performance))
        .with_state(state)
}

/// Serve the admin API until shutdown.
pub async fn serve(
    state: AdminState,
    listener: TcpListener,
    mut shutdown: Watcher,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin API server starting");

    axum::serve(listener, admin_router(state))
        .with_graceful_shutdown(async move {
            shutdown.triggered().await;
        })
        .await?;

    tracing::info!("Admin API server stopped");
    Ok(())
}
