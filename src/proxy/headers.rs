//! Client IP resolution, forwarded headers and protocol detection.
//!
//! # Responsibilities
//! - Work out the real client IP behind trusted intermediate proxies
//! - Inject the standard forwarded headers on outbound requests
//! - Classify requests into protocol tags for policy overrides
//!
//! # Design Decisions
//! - X-Forwarded-For is only believed when the immediate TCP peer falls
//!   inside a configured trusted-proxy CIDR
//! - The configured real-IP header, when present, is returned unmodified
//! - Header injection appends, never rewrites, an existing
//!   X-Forwarded-For chain

use std::net::IpAddr;

use axum::http::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, HOST, UPGRADE};
use ipnet::IpNet;

use crate::config::schema::{ProtocolTag, ServerConfig};

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
pub const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// Parse the configured trusted-proxy list. Entries may be CIDR blocks or
/// bare addresses; unparseable entries are dropped with a warning.
pub fn parse_trusted_proxies(entries: &[String]) -> Vec<IpNet> {
    entries
        .iter()
        .filter_map(|entry| {
            if let Ok(net) = entry.parse::<IpNet>() {
                return Some(net);
            }
            if let Ok(addr) = entry.parse::<IpAddr>() {
                return Some(IpNet::from(addr));
            }
            tracing::warn!(entry = %entry, "Ignoring unparseable trusted_proxies entry");
            None
        })
        .collect()
}

pub fn is_trusted_proxy(peer: IpAddr, trusted: &[IpNet]) -> bool {
    trusted.iter().any(|net| net.contains(&peer))
}

/// Resolve the client IP for a request.
///
/// Precedence: the configured real-IP header verbatim, then the first
/// X-Forwarded-For entry when the peer is a trusted proxy, then the TCP
/// peer address.
pub fn resolve_client_ip(
    headers: &HeaderMap,
    peer: IpAddr,
    server: &ServerConfig,
    trusted: &[IpNet],
) -> String {
    if !server.real_ip_header.is_empty() {
        if let Some(value) = headers
            .get(server.real_ip_header.as_str())
            .and_then(|v| v.to_str().ok())
        {
            if !value.is_empty() {
                return value.to_string();
            }
        }
    }

    if let Some(forwarded) = headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        let first = forwarded.split(',').next().unwrap_or("").trim();
        if !first.is_empty() && is_trusted_proxy(peer, trusted) {
            return first.to_string();
        }
    }

    peer.to_string()
}

/// Inject the forwarded headers on an outbound request.
pub fn apply_forwarded_headers(
    headers: &mut HeaderMap,
    client_ip: &str,
    real_ip_header: &str,
    proto: &'static str,
) {
    let chained = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(existing) if !existing.is_empty() => format!("{}, {}", existing, client_ip),
        _ => client_ip.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&chained) {
        headers.insert(
            HeaderName::from_static(X_FORWARDED_FOR),
            value,
        );
    }

    if !real_ip_header.is_empty() {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(real_ip_header.as_bytes()),
            HeaderValue::from_str(client_ip),
        ) {
            headers.insert(name, value);
        }
    }

    headers.insert(
        HeaderName::from_static(X_FORWARDED_PROTO),
        HeaderValue::from_static(proto),
    );

    if let Some(host) = headers.get(HOST).cloned() {
        headers.insert(HeaderName::from_static(X_FORWARDED_HOST), host);
    }
}

/// Derive the protocol tag used for policy overrides.
pub fn detect_protocol(headers: &HeaderMap, is_tls: bool) -> ProtocolTag {
    if headers
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "websocket")
    {
        return ProtocolTag::WebSocket;
    }

    if headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "text/event-stream")
    {
        return ProtocolTag::Sse;
    }

    if is_tls {
        ProtocolTag::Https
    } else {
        ProtocolTag::Http
    }
}
