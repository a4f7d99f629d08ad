//! Client identification utilities
//!
//! Common functions for identifying clients via HTTP headers.
//! `X-Forwarded-For` is only believed when the socket peer is a configured
//! reverse proxy; anyone else could write whatever address they like there.

use axum::http::{HeaderMap, header};
use std::net::{AddrParseError, IpAddr};
use std::str::FromStr;
use std::sync::Arc;

/// Longest User-Agent kept for audit records
const MAX_USER_AGENT_LEN: usize = 512;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Where a request came from, as recorded in sessions and audit entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientContext {
    /// Client IP address (socket peer, or forwarded by a trusted proxy)
    pub ip: Option<IpAddr>,
    /// User-Agent string, truncated
    pub user_agent: Option<String>,
}

impl ClientContext {
    pub fn new(ip: Option<IpAddr>, user_agent: Option<String>) -> Self {
        Self { ip, user_agent }
    }

    /// Build from request headers and the socket peer, if known
    pub fn from_headers(
        headers: &HeaderMap,
        peer: Option<IpAddr>,
        trusted: &TrustedProxies,
    ) -> Self {
        let user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|ua| ua.chars().take(MAX_USER_AGENT_LEN).collect());

        Self {
            ip: extract_client_ip(headers, peer, trusted),
            user_agent,
        }
    }

    /// Get IP as string (for database storage and rate-limit keys)
    pub fn ip_string(&self) -> Option<String> {
        self.ip.map(|ip| ip.to_string())
    }

    /// Rate-limit key for this client; all unidentifiable clients share one bucket
    pub fn ip_key(&self) -> String {
        self.ip_string().unwrap_or_else(|| "unknown".to_string())
    }
}

/// Reverse proxies allowed to report the client address
///
/// Parsed from a comma-separated list such as `10.0.0.2, ::1`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustedProxies(Arc<[IpAddr]>);

impl TrustedProxies {
    pub fn new(proxies: impl IntoIterator<Item = IpAddr>) -> Self {
        Self(proxies.into_iter().collect())
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.0.contains(ip)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for TrustedProxies {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::parse::<IpAddr>)
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }
}

/// Resolve the client address
///
/// An untrusted peer is the client. Behind a trusted peer, the
/// `X-Forwarded-For` chain is walked from the right, skipping further
/// trusted hops; the first other address is the client. A malformed hop
/// ends the walk at the last address that was vouched for.
pub fn extract_client_ip(
    headers: &HeaderMap,
    peer: Option<IpAddr>,
    trusted: &TrustedProxies,
) -> Option<IpAddr> {
    let peer = peer?;
    if !trusted.contains(&peer) {
        return Some(peer);
    }

    let hops: Vec<&str> = headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .collect();

    let mut client = peer;
    for hop in hops.iter().rev() {
        let Ok(ip) = hop.trim().parse::<IpAddr>() else {
            break;
        };
        client = ip;
        if !trusted.contains(&ip) {
            break;
        }
    }
    Some(client)
}
