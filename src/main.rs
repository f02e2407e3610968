//! Flowgate reverse proxy.
//!
//! A reverse HTTP proxy built on Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌────────────────────────────────────────────────┐
//!                  │                   FLOWGATE                     │
//!                  │                                                │
//!  Client ─────────┼─▶ proxy::server ──▶ routing ──▶ balancer ──────┼──▶ Backend
//!                  │        │               │            │          │
//!                  │        │          route table   policy table   │
//!                  │        ▼               ▲            ▲          │
//!                  │   forwarded hdrs       │            │          │
//!                  │                   DispatchState snapshot       │
//!                  │                        ▲                       │
//!                  │   config::manager ─────┘ (swap on update)      │
//!                  │        ▲                                       │
//!  Operator ───────┼─▶ admin API ──▶ backend atomics (drain, limit) │
//!                  │                                                │
//!                  │   monitor (sampler) · lifecycle · metrics      │
//!                  └────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use flowgate::admin::{self, AdminState};
use flowgate::lifecycle::{signals, Shutdown};
use flowgate::monitor::PerformanceMonitor;
use flowgate::observability::{logging, metrics};
use flowgate::{ConfigManager, ProxyServer};

#[derive(Parser)]
#[command(name = "flowgate")]
#[command(about = "Reverse HTTP proxy with pluggable load balancing", long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "configs/config.toml")]
    config: PathBuf,

    /// Optional Prometheus exporter bind address.
    #[arg(long)]
    metrics_addr: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    logging::init();

    let manager = match ConfigManager::new(&args.config) {
        Ok(manager) => Arc::new(manager),
        Err(error) => {
            tracing::error!(path = %args.config.display(), error = %error, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };
    let config = manager.current();

    if let Some(addr) = args.metrics_addr {
        metrics::init_metrics(addr);
    }

    let shutdown = Shutdown::new();

    let (monitor, mut reports) = PerformanceMonitor::new(config.server.max_conn);
    monitor.spawn(shutdown.subscribe());
    tokio::spawn(async move {
        while let Some(report) = reports.recv().await {
            tracing::debug!(
                cpu = report.cpu_usage,
                memory = report.memory_usage,
                "Performance report"
            );
        }
    });

    let proxy = ProxyServer::new(config.clone(), monitor.clone());
    let proxy_state = proxy.state();

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = match TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(error) => {
            tracing::error!(address = %bind_addr, error = %error, "Failed to bind proxy listener");
            return ExitCode::FAILURE;
        }
    };

    if config.grpc.enabled {
        let admin_addr = format!("{}:{}", config.grpc.host, config.grpc.port);
        let admin_listener = match TcpListener::bind(&admin_addr).await {
            Ok(listener) => listener,
            Err(error) => {
                tracing::error!(address = %admin_addr, error = %error, "Failed to bind admin listener");
                return ExitCode::FAILURE;
            }
        };
        let admin_state = AdminState {
            config: manager.clone(),
            dispatch: proxy_state.inner.clone(),
            monitor: monitor.clone(),
        };
        let admin_shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            if let Err(error) = admin::serve(admin_state, admin_listener, admin_shutdown).await {
                tracing::error!(error = %error, "Admin API server failed");
            }
        });
    }

    let config_updates = manager.subscribe();
    let server_shutdown = shutdown.subscribe();

    let mut proxy_task = tokio::spawn(async move {
        proxy.run(listener, config_updates, server_shutdown).await
    });

    tokio::select! {
        _ = signals::wait_for_termination() => shutdown.trigger(),
        result = &mut proxy_task => {
            tracing::error!("Proxy server exited unexpectedly");
            if let Ok(Err(error)) = result {
                tracing::error!(error = %error, "Proxy server failed");
            }
            return ExitCode::FAILURE;
        }
    }

    match proxy_task.await {
        Ok(Ok(())) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Ok(Err(error)) => {
            tracing::error!(error = %error, "Proxy server failed");
            ExitCode::FAILURE
        }
        Err(error) => {
            tracing::error!(error = %error, "Proxy task panicked");
            ExitCode::FAILURE
        }
    }
}
