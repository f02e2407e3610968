//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for (de)serialization from the config file;
//! durations are human-readable tokens such as `30s` or `500ms`.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Front-end listener settings.
    pub server: ServerConfig,

    /// TLS material for the listener.
    pub ssl: SslConfig,

    /// Upstream name -> backend definitions.
    pub backends: BTreeMap<String, Vec<BackendConfig>>,

    /// Rule name -> routing rule.
    pub routing: BTreeMap<String, RoutingRule>,

    /// Admin API binding. The section keeps its historical name for
    /// compatibility with existing config files.
    pub grpc: GrpcConfig,
}

/// Front-end server configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host (e.g. "0.0.0.0").
    pub host: String,

    /// Bind port.
    pub port: u16,

    /// Client read timeout.
    #[serde(with = "duration_token")]
    pub read_timeout: Duration,

    /// Client write timeout.
    #[serde(with = "duration_token")]
    pub write_timeout: Duration,

    /// Maximum concurrent client connections.
    pub max_conn: usize,

    /// Header trusted to carry the real client IP.
    pub real_ip_header: String,

    /// CIDR list of proxies allowed to set X-Forwarded-For.
    pub trusted_proxies: Vec<String>,
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SslConfig {
    pub enabled: bool,
    pub cert_file: String,
    pub key_file: String,
}

/// A single backend server definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Stable identifier within the upstream. Synthesised from
    /// `<upstream>-<host>-<port>` when left empty.
    pub id: String,

    /// Human-readable label.
    pub name: String,

    /// Destination host.
    pub host: String,

    /// Destination port.
    pub port: u16,

    /// Relative share for weighted policies. 0 means ineligible
    /// for weighted selection.
    pub weight: u32,

    /// "http" or "https".
    pub scheme: String,

    /// Whether the backend may receive traffic at all.
    pub active: bool,

    /// Concurrent-connection ceiling; <= 0 means unbounded.
    pub max_conn: i64,

    /// Optional health-check block. Parsed and defaulted; probing is a
    /// hook for an external checker.
    pub health_check: Option<HealthCheckConfig>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            host: String::new(),
            port: 0,
            weight: 0,
            scheme: String::new(),
            active: true,
            max_conn: 0,
            health_check: None,
        }
    }
}

/// Health-check settings for a backend.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    pub path: String,

    #[serde(with = "duration_token")]
    pub interval: Duration,

    #[serde(with = "duration_token")]
    pub timeout: Duration,

    pub failures: u32,
}

/// A routing rule mapping a path prefix to an upstream.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingRule {
    /// Path prefix to match.
    pub path: String,

    /// Upstream name to dispatch to.
    pub upstream: String,

    /// Default load-balancer policy identifier.
    pub load_balancer: String,

    /// Per-protocol policy overrides.
    pub protocols: BTreeMap<ProtocolTag, String>,
}

/// Protocol tags a request can be classified as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolTag {
    Http,
    Https,
    WebSocket,
    Sse,
}

/// Admin API server binding.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GrpcConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

/// Fill in defaults for fields that were left zero or empty.
pub fn apply_defaults(config: &mut Config) {
    let server = &mut config.server;
    if server.read_timeout.is_zero() {
        server.read_timeout = Duration::from_secs(30);
    }
    if server.write_timeout.is_zero() {
        server.write_timeout = Duration::from_secs(30);
    }
    if server.max_conn == 0 {
        server.max_conn = 10_000;
    }
    if server.real_ip_header.is_empty() {
        server.real_ip_header = "X-Real-IP".to_string();
    }

    for (upstream, backends) in &mut config.backends {
        for backend in backends.iter_mut() {
            if backend.id.is_empty() {
                backend.id = format!("{}-{}-{}", upstream, backend.host, backend.port);
            }
            if backend.weight == 0 {
                backend.weight = 100;
            }
            if backend.scheme.is_empty() {
                backend.scheme = "http".to_string();
            }
            if backend.max_conn == 0 {
                backend.max_conn = 1_000;
            }
            if let Some(hc) = &mut backend.health_check {
                if hc.interval.is_zero() {
                    hc.interval = Duration::from_secs(30);
                }
                if hc.timeout.is_zero() {
                    hc.timeout = Duration::from_secs(5);
                }
                if hc.failures == 0 {
                    hc.failures = 3;
                }
            }
        }
    }

    for rule in config.routing.values_mut() {
        if rule.path.is_empty() {
            rule.path = "/".to_string();
        }
        if rule.load_balancer.is_empty() {
            rule.load_balancer = "least_connections_weight".to_string();
        }
    }
}

/// Serde adapter for duration tokens (`30s`, `500ms`, `5m`, `1h`).
pub mod duration_token {
    use std::time::Duration;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let token = String::deserialize(d)?;
        parse(&token).map_err(D::Error::custom)
    }

    /// Parse a duration token. The unit suffix is required except for "0".
    pub fn parse(token: &str) -> Result<Duration, String> {
        let token = token.trim();
        if token == "0" {
            return Ok(Duration::ZERO);
        }
        let split = token
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("missing unit in duration {:?}", token))?;
        let (digits, unit) = token.split_at(split);
        let value: u64 = digits
            .parse()
            .map_err(|_| format!("invalid duration {:?}", token))?;
        match unit {
            "ms" => Ok(Duration::from_millis(value)),
            "s" => Ok(Duration::from_secs(value)),
            "m" => Ok(Duration::from_secs(value * 60)),
            "h" => Ok(Duration::from_secs(value * 3600)),
            _ => Err(format!("unknown duration unit {:?}", unit)),
        }
    }

    /// Render a duration with the largest exact unit.
    pub fn format(d: Duration) -> String {
        if d.is_zero() {
            return "0".to_string();
        }
        if d.subsec_millis() != 0 || d.as_secs() == 0 {
            return format!("{}ms", d.as_millis());
        }
        let secs = d.as_secs();
        if secs % 3600 == 0 {
            format!("{}h", secs / 3600)
        } else if secs % 60 == 0 {
            format!("{}m", secs / 60)
        } else {
            format!("{}s", secs)
        }
    }
}
