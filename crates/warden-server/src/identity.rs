//! Caller identity extraction.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use warden_core::ClientIdentity;

use crate::server::AppState;

/// Proxy headers consulted, most trusted first.
const CONNECTING_IP: &str = "cf-connecting-ip";
const FORWARDED_FOR: &str = "x-forwarded-for";
const REAL_IP: &str = "x-real-ip";

/// Derive the rate-limit key for a request.
///
/// With `trust_proxy` set: `CF-Connecting-IP`, then the first
/// `X-Forwarded-For` entry, then `X-Real-IP`. Otherwise, or if none is
/// present, the socket peer address, falling back to `"unknown"`.
pub fn client_identity(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_proxy: bool,
) -> ClientIdentity {
    if trust_proxy {
        let from_headers = header_value(headers, CONNECTING_IP)
            .or_else(|| {
                header_value(headers, FORWARDED_FOR)
                    .and_then(|v| v.split(',').next().map(str::trim).filter(|s| !s.is_empty()))
            })
            .or_else(|| header_value(headers, REAL_IP));
        if let Some(ip) = from_headers {
            return ClientIdentity::from_raw(ip);
        }
    }
    peer.map_or_else(ClientIdentity::unknown, |addr| {
        ClientIdentity::from_raw(addr.ip().to_string())
    })
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Extractor yielding the caller's [`ClientIdentity`].
#[derive(Clone, Debug)]
pub struct Caller(pub ClientIdentity);

impl FromRequestParts<AppState> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Self(client_identity(&parts.headers, peer, state.trust_proxy_headers)))
    }
}
