//! Client identity resolution from transport metadata.

use axum::http::HeaderMap;
use std::net::SocketAddr;

/// Identity shared by every request that carries no usable source.
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Proxy-chain header; the first hop is the originating client.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
/// Header set by a single fronting proxy.
pub const REAL_IP_HEADER: &str = "x-real-ip";

/// The pieces of a request used to bucket its sender.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportMetadata {
    /// Raw `X-Forwarded-For` value
    pub forwarded_for: Option<String>,
    /// Raw `X-Real-IP` value
    pub real_ip: Option<String>,
    /// Peer address of the connection
    pub remote_addr: Option<SocketAddr>,
}

impl TransportMetadata {
    /// Collect metadata from request headers and the peer address.
    ///
    /// Headers that are not valid visible ASCII are ignored.
    pub fn from_headers(headers: &HeaderMap, remote_addr: Option<SocketAddr>) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };

        Self {
            forwarded_for: header(FORWARDED_FOR_HEADER),
            real_ip: header(REAL_IP_HEADER),
            remote_addr,
        }
    }

    /// Metadata for a bare peer address with no proxy headers.
    pub fn from_remote(remote_addr: SocketAddr) -> Self {
        Self {
            remote_addr: Some(remote_addr),
            ..Self::default()
        }
    }

    /// Resolve the identity string for this request.
    ///
    /// Preference order is the forwarded-for chain (first hop), then the
    /// real-IP header, then the peer IP. Never fails.
    pub fn resolve(&self) -> String {
        let forwarded = self
            .forwarded_for
            .as_deref()
            .and_then(|chain| chain.split(',').next());

        [forwarded, self.real_ip.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|value| !value.is_empty())
            .map(str::to_owned)
            .or_else(|| self.remote_addr.map(|addr| addr.ip().to_string()))
            .unwrap_or_else(|| UNKNOWN_IDENTITY.to_string())
    }
}
