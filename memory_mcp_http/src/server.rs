//! HTTP server: router, endpoint handlers, and lifecycle.

use crate::access::{self, AccessConfig, MAX_BODY_BYTES};
use crate::cleanup::{CleanupScheduler, DEFAULT_CLEANUP_INTERVAL, DEFAULT_SESSION_TIMEOUT};
use crate::dispatcher::JsonRpcDispatcher;
use crate::error::{Result, ServerError};
use crate::request_handler::{self, session_id_from_headers, with_session_header};
use crate::session::SessionRegistry;
use crate::sse::{DEFAULT_HEARTBEAT_INTERVAL, SseBroadcaster, timestamp_now};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::HeaderMap,
    middleware,
    response::{
        IntoResponse, Response,
        sse::{Event, Sse},
    },
    routing::{get, post},
};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::{convert::Infallible, future::Future, net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// Configuration for the HTTP server.
///
/// # Example
///
/// ```rust
/// use memory_mcp_http::ServerConfig;
/// use std::time::Duration;
///
/// let config = ServerConfig {
///     bind_addr: "127.0.0.1:8080".parse().unwrap(),
///     session_timeout: Duration::from_secs(15 * 60),
///     ..Default::default()
/// };
/// assert!(config.access.dns_rebinding_protection);
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind. Port 0 picks a free port.
    pub bind_addr: SocketAddr,
    /// Origin and host allow-lists.
    pub access: AccessConfig,
    /// Sessions idle for longer than this are expired.
    pub session_timeout: Duration,
    /// Period of the expiry sweep.
    pub cleanup_interval: Duration,
    /// Period of the `ping` frame on each SSE connection.
    pub heartbeat_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            access: AccessConfig::default(),
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

/// Shared state for the router.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub broadcaster: Arc<SseBroadcaster>,
    pub dispatcher: Arc<JsonRpcDispatcher>,
}

impl AppState {
    pub fn new(dispatcher: JsonRpcDispatcher, heartbeat_interval: Duration) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let broadcaster = Arc::new(SseBroadcaster::with_heartbeat(
            Arc::clone(&registry),
            heartbeat_interval,
        ));
        Self {
            registry,
            broadcaster,
            dispatcher: Arc::new(dispatcher),
        }
    }
}

/// Build the application router.
///
/// Layers, outermost first: tracing, CORS, security headers, host guard,
/// body limit. The host guard therefore runs before any handler, and
/// rejections still carry the security headers.
pub fn build_router(state: AppState, access: &AccessConfig) -> Router {
    let cors = access::build_cors_layer(access);
    Router::new()
        .route("/health", get(health_check))
        .route("/mcp", post(handle_mcp_post).get(handle_sse_stream))
        .route("/sse/", get(handle_sse_stream))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn_with_state(
            Arc::new(access.clone()),
            access::host_guard,
        ))
        .layer(middleware::from_fn(access::security_headers))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds `config.bind_addr` and serves until `shutdown` resolves.
///
/// ```rust,no_run
/// use memory_mcp_http::{JsonRpcDispatcher, ServerConfig, start_server};
///
/// #[tokio::main]
/// async fn main() {
///     let shutdown = async {
///         let _ = tokio::signal::ctrl_c().await;
///     };
///     if let Err(e) = start_server(ServerConfig::default(), JsonRpcDispatcher::unconfigured(), shutdown).await {
///         eprintln!("Server failed: {}", e);
///     }
/// }
/// ```
pub async fn start_server<F>(
    config: ServerConfig,
    dispatcher: JsonRpcDispatcher,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .map_err(|e| ServerError::HttpServer(format!("Failed to bind {}: {}", config.bind_addr, e)))?;
    serve(listener, config, dispatcher, shutdown).await
}

/// Serves on an already bound listener until `shutdown` resolves.
///
/// On shutdown the cleanup task is stopped and every open SSE connection is
/// closed so in-flight streams end and the server can drain.
pub async fn serve<F>(
    listener: TcpListener,
    config: ServerConfig,
    dispatcher: JsonRpcDispatcher,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let local_addr = listener
        .local_addr()
        .map_err(|e| ServerError::HttpServer(format!("Failed to get local addr: {}", e)))?;

    if !dispatcher.has_handler() {
        info!("No request handler configured; JSON-RPC calls will answer 503");
    }

    let state = AppState::new(dispatcher, config.heartbeat_interval);
    let app = build_router(state.clone(), &config.access);

    let stop = CancellationToken::new();
    let cleanup = CleanupScheduler::new(
        Arc::clone(&state.registry),
        Arc::clone(&state.broadcaster),
        config.session_timeout,
        config.cleanup_interval,
    )
    .spawn(stop.clone());

    info!("MCP server listening on http://{}", local_addr);
    info!("MCP endpoint (POST): http://{}/mcp", local_addr);
    info!("MCP endpoint (GET/SSE): http://{}/mcp", local_addr);
    info!(
        "DNS rebinding protection: {}",
        if config.access.dns_rebinding_protection {
            "enabled"
        } else {
            "disabled"
        }
    );

    let drain_state = state.clone();
    let drain_stop = stop.clone();
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("Shutdown requested, closing SSE connections");
            drain_stop.cancel();
            for session in drain_state.registry.all() {
                drain_state.broadcaster.close_session(&session);
            }
        })
        .await;

    stop.cancel();
    let _ = cleanup.await;
    info!("MCP server stopped");

    result.map_err(|e| ServerError::HttpServer(format!("Server error: {}", e)))
}

/// `GET /health`
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": timestamp_now(),
        "sessions": state.registry.count(),
    }))
}

/// `POST /mcp`
async fn handle_mcp_post(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    request_handler::handle_mcp_request(
        &state.registry,
        &state.broadcaster,
        &state.dispatcher,
        &headers,
        &body,
    )
    .await
}

#[derive(Debug, Default, Deserialize)]
struct SseQuery {
    session: Option<String>,
}

/// `GET /mcp` and `GET /sse/`: open a push stream on the session named by
/// `X-Session-ID` (or `?session=`), creating one when it is absent or
/// unknown.
///
/// ```javascript
/// const events = new EventSource("http://localhost:3000/sse/?session=" + sessionId);
/// events.onmessage = (e) => console.log(JSON.parse(e.data).type);
/// ```
async fn handle_sse_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SseQuery>,
) -> Response {
    let requested = session_id_from_headers(&headers).or_else(|| {
        query
            .session
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    });
    let session = state.registry.get_or_create(requested.as_deref());
    let subscription = state.broadcaster.subscribe(&session);
    debug!(
        session_id = %session.id,
        connection_id = %subscription.connection_id(),
        "SSE stream opened"
    );

    let stream = subscription
        .into_stream()
        .map(|event| Ok::<_, Infallible>(Event::default().data(event.to_json())));

    with_session_header(Sse::new(stream).into_response(), &session.id)
}
