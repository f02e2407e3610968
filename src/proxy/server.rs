//! Proxy server and per-request dispatch pipeline.

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, State},
    http::header::{HOST, TRANSFER_ENCODING},
    http::uri::{Authority, PathAndQuery, Scheme},
    http::{Method, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use ipnet::IpNet;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::balancer::backend::ConnectionGuard;
use crate::balancer::upstream::Registry;
use crate::balancer::{Balancer, RequestInfo, SelectionError};
use crate::config::schema::Config;
use crate::lifecycle::Watcher;
use crate::monitor::PerformanceMonitor;
use crate::observability::metrics;
use crate::proxy::headers::{
    apply_forwarded_headers, detect_protocol, parse_trusted_proxies, resolve_client_ip,
};
use crate::proxy::DispatchError;
use crate::routing::RouteTable;

/// Cap on buffered request bodies. Bodies are buffered so an idempotent
/// retry can resend them.
const MAX_REQUEST_BODY: usize = 4 * 1024 * 1024;

/// Upstream connect timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Ceiling on a single upstream exchange (connect to response headers).
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything a dispatch needs, published as one snapshot. A request
/// loads the snapshot once and keeps it for its whole lifetime, so a
/// config swap never changes the world under an in-flight request.
#[derive(Debug)]
pub struct DispatchState {
    pub config: Arc<Config>,
    pub registry: Registry,
    pub routes: RouteTable,
    pub trusted_proxies: Vec<IpNet>,
}

impl DispatchState {
    /// Build a snapshot, carrying backend runtime state over from the
    /// previous snapshot where identities match.
    pub fn from_config(config: Arc<Config>, previous: Option<&DispatchState>) -> Self {
        let registry = Registry::from_config(&config, previous.map(|p| &p.registry));
        let routes = RouteTable::from_config(&config);
        let trusted_proxies = parse_trusted_proxies(&config.server.trusted_proxies);
        Self {
            config,
            registry,
            routes,
            trusted_proxies,
        }
    }
}

/// Shared state injected into the dispatch handler.
#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<ArcSwap<DispatchState>>,
    pub client: Client<HttpConnector, Body>,
    pub balancer: Arc<Balancer>,
    pub monitor: Arc<PerformanceMonitor>,
    /// Whether the fronting listener terminates TLS; drives
    /// X-Forwarded-Proto and the https protocol tag.
    pub is_tls: bool,
}

/// The reverse proxy server.
pub struct ProxyServer {
    state: AppState,
    router: Router,
}

impl ProxyServer {
    pub fn new(config: Arc<Config>, monitor: Arc<PerformanceMonitor>) -> Self {
        let is_tls = config.ssl.enabled;
        let write_timeout = config.server.write_timeout;
        let max_conn = config.server.max_conn.max(1);

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(CONNECT_TIMEOUT));
        connector.set_nodelay(true);
        let client = Client::builder(TokioExecutor::new()).build(connector);

        let state = AppState {
            inner: Arc::new(ArcSwap::from_pointee(DispatchState::from_config(
                config, None,
            ))),
            client,
            balancer: Arc::new(Balancer::new()),
            monitor,
            is_tls,
        };

        let router = Router::new()
            .route("/{*path}", any(dispatch_handler))
            .route("/", any(dispatch_handler))
            .with_state(state.clone())
            .layer(TimeoutLayer::new(write_timeout))
            .layer(GlobalConcurrencyLimitLayer::new(max_conn))
            .layer(TraceLayer::new_for_http());

        Self { state, router }
    }

    /// A handle onto the live dispatch state, shared with the admin
    /// control plane.
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Serve until shutdown, swapping the dispatch snapshot on every
    /// config notification.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::Receiver<Arc<Config>>,
        mut shutdown: Watcher,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, tls = self.state.is_tls, "Proxy server starting");

        let inner = self.state.inner.clone();
        let swapper = tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                let previous = inner.load_full();
                let next = DispatchState::from_config(config, Some(&previous));
                inner.store(Arc::new(next));
                tracing::info!("Dispatch snapshot rebuilt from updated configuration");
            }
        });

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.triggered().await;
                tracing::info!("Proxy server draining");
            })
            .await?;

        swapper.abort();
        tracing::info!("Proxy server stopped");
        Ok(())
    }
}

/// Per-request pipeline: route, select, account, forward.
async fn dispatch_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let request_id = Uuid::new_v4();
    let snapshot = state.inner.load_full();
    let track = state.monitor.track();
    let path = request.uri().path().to_string();

    let Some(rule) = snapshot.routes.match_path(&path) else {
        tracing::debug!(request_id = %request_id, path = %path, "No route matched");
        return DispatchError::RoutingMiss.into_response();
    };

    let Some(upstream) = snapshot.registry.get(&rule.upstream) else {
        tracing::warn!(
            request_id = %request_id,
            upstream = %rule.upstream,
            "Routing rule references missing upstream"
        );
        return DispatchError::UpstreamUnknown.into_response();
    };

    let protocol = detect_protocol(request.headers(), state.is_tls);
    let policy = rule.policy_for(protocol);
    let candidates = upstream.live_backends();

    let client_ip = resolve_client_ip(
        request.headers(),
        peer.ip(),
        &snapshot.config.server,
        &snapshot.trusted_proxies,
    );

    let (parts, body) = request.into_parts();
    let Ok(body_bytes) = axum::body::to_bytes(body, MAX_REQUEST_BODY).await else {
        return DispatchError::BodyTooLarge.into_response();
    };

    let mut headers = parts.headers.clone();
    let proto: &'static str = if state.is_tls { "https" } else { "http" };
    apply_forwarded_headers(
        &mut headers,
        &client_ip,
        &snapshot.config.server.real_ip_header,
        proto,
    );
    // The outbound authority names the backend; hyper derives Host from
    // it. The buffered body travels with a concrete Content-Length.
    headers.remove(HOST);
    headers.remove(TRANSFER_ENCODING);

    let request_info = RequestInfo {
        client_ip: Some(&client_ip),
    };
    let attempts = if parts.method.is_idempotent() { 2 } else { 1 };

    for attempt in 1..=attempts {
        let backend = match state.balancer.select(policy, &candidates, &request_info) {
            Ok(backend) => backend,
            Err(SelectionError::AllAtConnectionLimit) => {
                tracing::debug!(
                    request_id = %request_id,
                    upstream = %upstream.name,
                    "All backends at connection limit"
                );
                return DispatchError::AllBackendsAtLimit.into_response();
            }
            Err(SelectionError::NoLiveBackends) => {
                tracing::warn!(
                    request_id = %request_id,
                    upstream = %upstream.name,
                    "No live backends"
                );
                return DispatchError::NoLiveBackends.into_response();
            }
        };

        let guard = backend.acquire();
        let outbound = match build_upstream_request(
            &parts.method,
            &parts.uri,
            &backend.scheme,
            &backend.authority,
            &headers,
            body_bytes.clone(),
        ) {
            Ok(request) => request,
            Err(response) => return response,
        };

        let started = Instant::now();
        match tokio::time::timeout(UPSTREAM_TIMEOUT, state.client.request(outbound)).await {
            Ok(Ok(response)) => {
                let status = response.status();
                metrics::record_request(parts.method.as_str(), status.as_u16(), &guard.id, started);

                let bytes_out = response
                    .headers()
                    .get(axum::http::header::CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0);
                state
                    .monitor
                    .record_request(bytes_out, body_bytes.len() as u64);

                tracing::debug!(
                    request_id = %request_id,
                    backend = %guard.id,
                    status = %status,
                    policy = policy.as_str(),
                    "Request dispatched"
                );

                // The guard rides inside the body so the gauge holds
                // until the response has fully streamed.
                let (parts, body) = response.into_parts();
                let body = Body::new(GuardedBody {
                    inner: body,
                    _guard: guard,
                    _track: track,
                });
                return Response::from_parts(parts, body);
            }
            Ok(Err(error)) => {
                tracing::warn!(
                    request_id = %request_id,
                    backend = %guard.id,
                    attempt,
                    error = %error,
                    "Upstream request failed"
                );
            }
            Err(_) => {
                tracing::warn!(
                    request_id = %request_id,
                    backend = %guard.id,
                    attempt,
                    "Upstream request timed out"
                );
            }
        }
        metrics::record_request(parts.method.as_str(), 502, &guard.id, started);
    }

    state.monitor.record_request(0, body_bytes.len() as u64);
    DispatchError::UpstreamTransport.into_response()
}

fn build_upstream_request(
    method: &Method,
    original: &Uri,
    scheme: &str,
    authority: &str,
    headers: &axum::http::HeaderMap,
    body: Bytes,
) -> Result<Request<Body>, Response> {
    let mut uri_parts = original.clone().into_parts();
    uri_parts.scheme = Some(if scheme == "https" {
        Scheme::HTTPS
    } else {
        Scheme::HTTP
    });
    uri_parts.authority = match Authority::try_from(authority) {
        Ok(authority) => Some(authority),
        Err(_) => {
            return Err(
                (StatusCode::BAD_GATEWAY, "Invalid backend address").into_response()
            )
        }
    };
    if uri_parts.path_and_query.is_none() {
        uri_parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }

    let uri = match Uri::from_parts(uri_parts) {
        Ok(uri) => uri,
        Err(_) => {
            return Err((StatusCode::INTERNAL_SERVER_ERROR, "URI rewrite failed").into_response())
        }
    };

    let mut request = Request::builder()
        .method(method.clone())
        .uri(uri)
        .body(Body::from(body))
        .map_err(|_| {
            (StatusCode::INTERNAL_SERVER_ERROR, "Request rebuild failed").into_response()
        })?;
    *request.headers_mut() = headers.clone();

    Ok(request)
}

/// Response body wrapper that keeps the backend connection guard (and the
/// monitor's active-connection track) alive until the body is done.
struct GuardedBody<B> {
    inner: B,
    _guard: ConnectionGuard,
    _track: crate::monitor::ConnectionTrack,
}

impl<B> http_body::Body for GuardedBody<B>
where
    B: http_body::Body + Unpin,
    Self: Unpin,
{
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<http_body::Frame<Self::Data>, Self::Error>>> {
        Pin::new(&mut self.inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> http_body::SizeHint {
        self.inner.size_hint()
    }
}
