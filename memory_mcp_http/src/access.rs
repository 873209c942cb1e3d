//! Request access control: CORS, DNS-rebinding host checks, and fixed
//! security headers.
//!
//! The pieces are applied as router layers in [`crate::server::build_router`]:
//!
//! - [`build_cors_layer`] grants CORS only to allow-listed origins.
//! - [`host_guard`] rejects requests whose `Host` is not trusted, before any
//!   routing (and therefore before any session is created).
//! - [`security_headers`] stamps every response, including rejections.

use axum::{
    Json,
    body::Body,
    extract::{Request, State},
    http::{HeaderName, HeaderValue, Method, StatusCode, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer, ExposeHeaders};
use tracing::{debug, warn};

/// Session header shared by the JSON-RPC and SSE endpoints.
pub const SESSION_ID_HEADER: &str = "x-session-id";

/// Maximum accepted JSON body.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

pub const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "https://claude.ai",
    "https://claude.ai/code",
    "http://localhost:*",
];

pub const DEFAULT_ALLOWED_HOSTS: &[&str] = &["localhost", "127.0.0.1"];

pub const DEFAULT_TRUSTED_HOST_SUFFIX: &str = "railway.app";

/// Origin and host allow-lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessConfig {
    /// Exact origins, or prefixes when the entry ends in `*`.
    pub allowed_origins: Vec<String>,
    /// Hosts accepted with or without a port.
    pub allowed_hosts: Vec<String>,
    /// Any host ending with this suffix is accepted. Empty disables the check.
    pub trusted_host_suffix: String,
    /// When false, `Host` is not checked at all.
    pub dns_rebinding_protection: bool,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            allowed_origins: DEFAULT_ALLOWED_ORIGINS.iter().map(|s| s.to_string()).collect(),
            allowed_hosts: DEFAULT_ALLOWED_HOSTS.iter().map(|s| s.to_string()).collect(),
            trusted_host_suffix: DEFAULT_TRUSTED_HOST_SUFFIX.to_string(),
            dns_rebinding_protection: true,
        }
    }
}

impl AccessConfig {
    /// Whether a browser `Origin` may receive CORS grants.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|allowed| {
            match allowed.strip_suffix('*') {
                Some(prefix) => origin.starts_with(prefix),
                None => origin == allowed,
            }
        })
    }

    /// Whether a `Host` header value is trusted. Always true when rebinding
    /// protection is off.
    pub fn is_host_allowed(&self, host: &str) -> bool {
        if !self.dns_rebinding_protection {
            return true;
        }

        let host = host.trim().to_ascii_lowercase();
        let hostname = strip_port(&host);

        let listed = self.allowed_hosts.iter().any(|allowed| {
            let allowed = allowed.trim().to_ascii_lowercase();
            allowed == host || allowed == hostname
        });
        if listed {
            return true;
        }

        // The suffix must start at a label boundary: `a.railway.app` matches,
        // `evilrailway.app` does not.
        let suffix = self
            .trusted_host_suffix
            .trim()
            .trim_start_matches('.')
            .to_ascii_lowercase();
        !suffix.is_empty()
            && (hostname == suffix
                || hostname
                    .strip_suffix(suffix.as_str())
                    .is_some_and(|label| label.ends_with('.')))
    }
}

/// `example.com:8080` → `example.com`, `[::1]:3000` → `::1`.
fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match host.rsplit_once(':') {
        // More than one colon without brackets is a bare IPv6 literal.
        Some((name, port)) if !name.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => {
            name
        }
        _ => host,
    }
}

/// CORS layer granting access only to allow-listed origins.
///
/// Requests without an `Origin` header are not cross-origin and pass
/// through untouched. Disallowed origins get no grant headers, which the
/// browser enforces.
pub fn build_cors_layer(config: &AccessConfig) -> CorsLayer {
    let access = Arc::new(config.clone());
    let session_header = HeaderName::from_static(SESSION_ID_HEADER);

    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &Parts| {
                let allowed = origin
                    .to_str()
                    .map(|o| access.is_origin_allowed(o))
                    .unwrap_or(false);
                if !allowed {
                    debug!(origin = ?origin, "CORS origin not allowed");
                }
                allowed
            },
        ))
        .allow_credentials(true)
        .allow_methods(AllowMethods::list([Method::GET, Method::POST, Method::OPTIONS]))
        .allow_headers(AllowHeaders::list([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            session_header.clone(),
        ]))
        .expose_headers(ExposeHeaders::list([session_header]))
}

/// Rejects requests whose `Host` is not trusted with 403
/// `{"error":"Forbidden host"}`. A missing `Host` is let through.
pub async fn host_guard(
    State(access): State<Arc<AccessConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if let Some(host) = host
        && !access.is_host_allowed(&host)
    {
        warn!(host = %host, path = %request.uri().path(), "Rejected request for untrusted host");
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "Forbidden host" })),
        )
            .into_response();
    }

    next.run(request).await
}

/// Adds the fixed hardening headers to every response.
pub async fn security_headers(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::X_XSS_PROTECTION,
        HeaderValue::from_static("1; mode=block"),
    );

    response
}
