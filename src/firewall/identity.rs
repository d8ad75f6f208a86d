//! Client identity extraction from request headers.
//!
//! The IP and fingerprint are identity components, not validated addresses:
//! they are opaque strings that key rate buckets, strikes, and blocks.

use http::HeaderMap;
use std::net::SocketAddr;

/// Sentinel used when neither forwarding headers nor a peer address exist.
pub const UNKNOWN_IP: &str = "unknown";

pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Resolve the client IP: first `X-Forwarded-For` entry (comma-split,
/// trimmed), else the socket peer address, else [`UNKNOWN_IP`].
///
/// A non-empty header always decides, even when its first entry trims to a
/// blank string — such clients share the empty identity. Only a missing or
/// empty header falls back to the peer address.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(xff) = header_str(headers, "x-forwarded-for")
        && !xff.is_empty()
        && let Some(first) = xff.split(',').next().map(str::trim)
    {
        return first.to_owned();
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_IP.to_owned())
}

/// Read the client-supplied fingerprint token, if any.
pub fn fingerprint(headers: &HeaderMap, header_name: &str) -> Option<String> {
    header_str(headers, header_name).map(str::to_owned)
}
