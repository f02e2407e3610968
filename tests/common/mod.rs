//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use flowgate::config::schema::{BackendConfig, Config, RoutingRule};
use flowgate::monitor::PerformanceMonitor;
use flowgate::proxy::{AppState, ProxyServer};
use flowgate::Shutdown;

/// Start a mock backend that returns a fixed body.
pub async fn start_mock_backend(response: &'static str) -> SocketAddr {
    start_programmable_backend(move || async move { (200, response.to_string()) }).await
}

/// Start a programmable mock backend; the closure produces each response.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let mut buf = vec![0u8; 4096];
                        let _ = socket.read(&mut buf).await;
                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };
                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start a backend that echoes selected request headers, one
/// "name: value" per line, so tests can assert on the forwarded chain.
pub async fn start_header_echo_backend(header_names: &'static [&'static str]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut raw = Vec::new();
                        let mut buf = [0u8; 1024];
                        while !raw.windows(4).any(|w| w == b"\r\n\r\n") {
                            match socket.read(&mut buf).await {
                                Ok(0) | Err(_) => break,
                                Ok(n) => raw.extend_from_slice(&buf[..n]),
                            }
                        }
                        let head = String::from_utf8_lossy(&raw);
                        let mut body = String::new();
                        for line in head.lines().skip(1) {
                            if line.is_empty() {
                                break;
                            }
                            if let Some((name, value)) = line.split_once(':') {
                                let name = name.trim().to_ascii_lowercase();
                                if header_names.contains(&name.as_str()) {
                                    body.push_str(&format!("{}: {}\n", name, value.trim()));
                                }
                            }
                        }
                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start a backend that accepts connections, counts them and closes
/// without replying, producing an upstream transport error.
pub async fn start_slamming_backend(hits: Arc<std::sync::atomic::AtomicU32>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    hits.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    let mut buf = [0u8; 1024];
                    let _ = socket.read(&mut buf).await;
                    drop(socket);
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Describe one backend of a test upstream.
pub struct TestBackend {
    pub id: &'static str,
    pub addr: SocketAddr,
    pub weight: u32,
    pub max_conn: i64,
}

impl TestBackend {
    pub fn new(id: &'static str, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            weight: 1,
            max_conn: 100,
        }
    }

    pub fn weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn max_conn(mut self, max_conn: i64) -> Self {
        self.max_conn = max_conn;
        self
    }
}

/// Build a config with one upstream, one default rule and the given
/// policy.
pub fn proxy_config(policy: &str, backends: &[TestBackend]) -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 1; // placeholder, tests bind their own listener
    config.server.read_timeout = Duration::from_secs(30);
    config.server.write_timeout = Duration::from_secs(30);
    config.server.max_conn = 10_000;
    config.server.real_ip_header = "X-Real-IP".to_string();
    config.server.trusted_proxies = vec!["127.0.0.1".to_string()];

    config.backends.insert(
        "web".to_string(),
        backends
            .iter()
            .map(|b| BackendConfig {
                id: b.id.to_string(),
                name: b.id.to_string(),
                host: b.addr.ip().to_string(),
                port: b.addr.port(),
                weight: b.weight,
                scheme: "http".to_string(),
                active: true,
                max_conn: b.max_conn,
                health_check: None,
            })
            .collect(),
    );

    let mut routing = BTreeMap::new();
    routing.insert(
        "default".to_string(),
        RoutingRule {
            path: "/".to_string(),
            upstream: "web".to_string(),
            load_balancer: policy.to_string(),
            protocols: BTreeMap::new(),
        },
    );
    config.routing = routing;
    config
}

/// Start a proxy for the given config. Returns its address, the shared
/// state handle and the shutdown coordinator keeping the server alive.
pub async fn start_proxy(config: Config) -> (SocketAddr, AppState, Shutdown) {
    let (monitor, _reports) = PerformanceMonitor::new(config.server.max_conn);
    let server = ProxyServer::new(Arc::new(config), monitor);
    let state = server.state();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let watcher = shutdown.subscribe();
    let (_config_tx, config_rx) = mpsc::channel(1);
    tokio::spawn(async move {
        let _ = server.run(listener, config_rx, watcher).await;
    });

    wait_until_reachable(addr).await;
    (addr, state, shutdown)
}

/// Poll until the proxy accepts connections.
pub async fn wait_until_reachable(addr: SocketAddr) {
    for _ in 0..50 {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("server at {} never became reachable", addr);
}

/// A reqwest client that neither pools nor proxies, so each request
/// exercises the full dispatch path.
pub fn test_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
