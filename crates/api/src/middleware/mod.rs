//! HTTP middleware and extractors.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, HTTP context)
//! 2. `TraceLayer` (request span)
//! 3. Request ID (correlation header, span field, Sentry tag)
//! 4. Security headers
//! 5. CORS
//! 6. Rate limiting (governor, stricter on `/api/v1/auth`)
//!
//! Authentication is not a layer: handlers opt in through the `RequireAuth`
//! and `OptionalAuth` extractors.

pub mod auth;
pub mod client;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;

pub use auth::{OptionalAuth, RequireAuth};
pub use client::{SessionKey, client_ip};
pub use rate_limit::{api_rate_limiter, auth_rate_limiter};
pub use request_id::request_id_middleware;
pub use security_headers::security_headers_middleware;
