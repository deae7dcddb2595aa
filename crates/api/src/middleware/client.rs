//! Client address and guest-cart extractors.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, header::USER_AGENT, request::Parts},
};

use crate::error::AppError;
use crate::models::ClientInfo;

/// Header carrying the guest cart key.
pub const SESSION_KEY_HEADER: &str = "x-session-key";

/// Real client IP from proxy headers.
///
/// Checks Cloudflare's `CF-Connecting-IP` first, then the first hop of
/// `X-Forwarded-For`, `X-Real-IP` and Fly.io's `Fly-Client-IP`.
#[must_use]
pub fn client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    header("cf-connecting-ip")
        .and_then(|s| s.trim().parse().ok())
        .or_else(|| {
            header("x-forwarded-for")
                .and_then(|s| s.split(',').next())
                .and_then(|s| s.trim().parse().ok())
        })
        .or_else(|| header("x-real-ip").and_then(|s| s.trim().parse().ok()))
        .or_else(|| header("fly-client-ip").and_then(|s| s.trim().parse().ok()))
}

/// Proxy headers first, then the socket peer when the server was started
/// with connect info.
#[must_use]
pub fn request_ip(headers: &HeaderMap, extensions: &axum::http::Extensions) -> Option<IpAddr> {
    client_ip(headers).or_else(|| {
        extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    })
}

impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self {
            ip: request_ip(&parts.headers, &parts.extensions),
            user_agent: parts
                .headers
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_owned(),
        })
    }
}

/// The `X-Session-Key` header, when present and non-blank.
#[derive(Debug, Clone)]
pub struct SessionKey(pub Option<String>);

impl SessionKey {
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` when the header is missing.
    pub fn required(&self) -> Result<&str, AppError> {
        self.0
            .as_deref()
            .ok_or_else(|| AppError::BadRequest("Session key required for guest users".into()))
    }
}

impl<S> FromRequestParts<S> for SessionKey
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .headers
                .get(SESSION_KEY_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned),
        ))
    }
}
