//! Client key derivation for rate limiting.

use axum::http::HeaderMap;
use std::net::SocketAddr;

use crate::ratelimit::FALLBACK_KEY;

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Resolve the key a request is rate limited under.
///
/// With `trust_forwarded_for` the first address in `X-Forwarded-For` wins;
/// otherwise the peer IP is used. Requests with neither share the
/// fallback bucket.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get(FORWARDED_FOR)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        if let Some(origin) = forwarded {
            return origin.to_string();
        }
    }

    match peer {
        Some(addr) => addr.ip().to_string(),
        None => FALLBACK_KEY.to_string(),
    }
}

/// Scope a client key to a policy so endpoints keep separate quotas.
pub fn scoped_key(policy: &str, client: &str) -> String {
    format!("{}:{}", policy, client)
}
