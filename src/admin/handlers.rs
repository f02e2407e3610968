//! Admin API handlers.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::balancer::backend::PerformanceSnapshot;
use crate::config::loader::ConfigError;
use crate::config::schema::Config;

use super::AdminState;

#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
}

fn ok(message: impl Into<String>) -> Response {
    Json(ApiResponse {
        success: true,
        message: message.into(),
    })
    .into_response()
}

fn fail(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ApiResponse {
            success: false,
            message: message.into(),
        }),
    )
        .into_response()
}

pub async fn get_config(State(state): State<AdminState>) -> Response {
    let config = state.config.current();
    Json(json!({ "config": &*config })).into_response()
}

#[derive(Debug, Deserialize)]
pub struct UpdateConfigRequest {
    pub config: Config,
}

pub async fn update_config(
    State(state): State<AdminState>,
    Json(request): Json<UpdateConfigRequest>,
) -> Response {
    match state.config.update(request.config) {
        Ok(()) => ok("Configuration updated successfully"),
        Err(error @ ConfigError::Validation(_)) => {
            fail(StatusCode::BAD_REQUEST, error.to_string())
        }
        Err(error) => fail(StatusCode::INTERNAL_SERVER_ERROR, error.to_string()),
    }
}

pub async fn reload_ssl(State(state): State<AdminState>) -> Response {
    match state.config.reload_ssl() {
        Ok(()) => ok("SSL certificates reloaded successfully"),
        Err(error) => fail(StatusCode::INTERNAL_SERVER_ERROR, error.to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub struct UpstreamQuery {
    pub upstream: Option<String>,
}

pub async fn list_backends(
    State(state): State<AdminState>,
    Query(query): Query<UpstreamQuery>,
) -> Response {
    let Some(upstream_name) = query.upstream.filter(|u| !u.is_empty()) else {
        return fail(StatusCode::BAD_REQUEST, "upstream parameter required");
    };

    let snapshot = state.dispatch.load();
    let Some(upstream) = snapshot.registry.get(&upstream_name) else {
        return fail(StatusCode::NOT_FOUND, "upstream not found");
    };

    let backends: Vec<_> = upstream.backends().iter().map(|b| b.view()).collect();
    Json(json!({ "backends": backends })).into_response()
}

#[derive(Debug, Deserialize)]
pub struct UpdateBackendRequest {
    pub upstream_id: String,
    pub backend_id: String,
    pub max_conn: i64,
}

pub async fn update_backend(
    State(state): State<AdminState>,
    Json(request): Json<UpdateBackendRequest>,
) -> Response {
    if request.upstream_id.is_empty() || request.backend_id.is_empty() {
        return fail(
            StatusCode::BAD_REQUEST,
            "upstream_id and backend_id are required",
        );
    }

    let snapshot = state.dispatch.load();
    let Some(upstream) = snapshot.registry.get(&request.upstream_id) else {
        return fail(StatusCode::NOT_FOUND, "upstream not found");
    };
    let Some(backend) = upstream.find(&request.backend_id) else {
        return fail(StatusCode::NOT_FOUND, "backend not found");
    };

    backend.set_max_conn(request.max_conn);
    tracing::info!(
        upstream = %request.upstream_id,
        backend = %request.backend_id,
        max_conn = request.max_conn,
        "Backend connection limit updated"
    );
    ok("Backend updated successfully")
}

#[derive(Debug, Deserialize)]
pub struct DisconnectBackendRequest {
    pub upstream_id: String,
    pub backend_id: String,
}

/// Accept a drain request and apply it after responding. The balancer
/// observes the drain flag on its next selection; in-flight requests
/// finish naturally.
pub async fn disconnect_backend(
    State(state): State<AdminState>,
    Json(request): Json<DisconnectBackendRequest>,
) -> Response {
    if request.upstream_id.is_empty() || request.backend_id.is_empty() {
        return fail(
            StatusCode::BAD_REQUEST,
            "upstream_id and backend_id are required",
        );
    }

    let dispatch = state.dispatch.clone();
    tokio::spawn(async move {
        let snapshot = dispatch.load();
        let backend = snapshot
            .registry
            .get(&request.upstream_id)
            .and_then(|u| u.find(&request.backend_id).cloned());

        match backend {
            Some(backend) => {
                backend.mark_draining();
                tracing::info!(
                    upstream = %request.upstream_id,
                    backend = %request.backend_id,
                    connections = backend.get_connections(),
                    "Backend marked for draining"
                );
            }
            None => tracing::warn!(
                upstream = %request.upstream_id,
                backend = %request.backend_id,
                "Disconnect requested for unknown backend"
            ),
        }
    });

    ok("Backend disconnect request accepted")
}

pub async fn server_stats(State(state): State<AdminState>) -> Response {
    Json(json!({ "stats": state.monitor.server_stats() })).into_response()
}

#[derive(Debug, Deserialize)]
pub struct BackendStatsQuery {
    pub upstream: Option<String>,
    pub backend_id: Option<String>,
}

pub async fn backend_stats(
    State(state): State<AdminState>,
    Query(query): Query<BackendStatsQuery>,
) -> Response {
    let (Some(upstream_name), Some(backend_id)) = (
        query.upstream.filter(|u| !u.is_empty()),
        query.backend_id.filter(|b| !b.is_empty()),
    ) else {
        return fail(
            StatusCode::BAD_REQUEST,
            "upstream and backend_id parameters required",
        );
    };

    let snapshot = state.dispatch.load();
    let backend = snapshot
        .registry
        .get(&upstream_name)
        .and_then(|u| u.find(&backend_id).cloned());
    let Some(backend) = backend else {
        return fail(StatusCode::NOT_FOUND, "backend not found");
    };

    let stats = backend
        .performance()
        .map(|p| (*p).clone())
        .unwrap_or_default();
    Json(json!({ "stats": stats })).into_response()
}

#[derive(Debug, Deserialize)]
pub struct ReportPerformanceRequest {
    pub upstream: String,
    pub backend_id: String,
    pub performance: PerformanceSnapshot,
}

/// Accept a performance report and publish it after responding.
pub async fn report_performance(
    State(state): State<AdminState>,
    Json(request): Json<ReportPerformanceRequest>,
) -> Response {
    if request.upstream.is_empty() || request.backend_id.is_empty() {
        return fail(
            StatusCode::BAD_REQUEST,
            "upstream and backend_id are required",
        );
    }

    let dispatch = state.dispatch.clone();
    tokio::spawn(async move {
        let snapshot = dispatch.load();
        let backend = snapshot
            .registry
            .get(&request.upstream)
            .and_then(|u| u.find(&request.backend_id).cloned());

        match backend {
            Some(backend) => {
                tracing::debug!(
                    upstream = %request.upstream,
                    backend = %request.backend_id,
                    cpu = request.performance.cpu_usage,
                    memory = request.performance.memory_usage,
                    "Performance report applied"
                );
                backend.update_performance(request.performance);
            }
            None => tracing::warn!(
                upstream = %request.upstream,
                backend = %request.backend_id,
                "Performance report for unknown backend"
            ),
        }
    });

    ok("Performance data accepted")
}
