//! # Memory MCP HTTP
//!
//! An HTTP transport for a Model Context Protocol server backed by a remote
//! memory API.
//!
//! ## Architecture
//!
//! *   **JSON-RPC over POST**: `POST /mcp` carries one JSON-RPC 2.0 request and
//!     answers with its response. [`JsonRpcDispatcher`] validates the envelope
//!     and hands well-formed calls to a [`RequestHandler`].
//! *   **Sessions**: clients are grouped by the `X-Session-ID` header. Unknown
//!     or missing ids get a fresh session; idle sessions expire.
//! *   **Server-Sent Events**: `GET /mcp` (and `GET /sse/`) opens a push stream
//!     on a session. Every stream starts with a `connection` frame, receives a
//!     `ping` every 30 seconds, and sees a `request` frame whenever the session
//!     posts a request.
//! *   **Access control**: allow-listed CORS origins, DNS-rebinding protection
//!     on the `Host` header, and fixed security headers.
//! *   **stdio**: [`serve_stdio`] answers line-delimited JSON-RPC through the
//!     same dispatcher, for clients that launch the server as a subprocess.
//!
//! ## Example
//!
//! ```rust,no_run
//! use memory_mcp_http::{JsonRpcDispatcher, McpHandler, ServerConfig, ServerInfo, start_server};
//! use memory_mcp_tools::{MemoryApiClient, MemoryApiConfig, MemoryToolbox};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = MemoryApiClient::new(MemoryApiConfig::default())?;
//!     let handler = McpHandler::new(Arc::new(MemoryToolbox::new(client)), ServerInfo::default());
//!     let dispatcher = JsonRpcDispatcher::new(Arc::new(handler));
//!
//!     let shutdown = async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     };
//!     start_server(ServerConfig::default(), dispatcher, shutdown).await?;
//!     Ok(())
//! }
//! ```

pub mod access;
pub mod cleanup;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod request_handler;
pub mod server;
pub mod session;
pub mod sse;
pub mod stdio;

pub use access::AccessConfig;
pub use cleanup::CleanupScheduler;
pub use dispatcher::{Dispatched, JsonRpcDispatcher, JsonRpcError, JsonRpcResponse};
pub use error::{HandlerError, Result, ServerError};
pub use handler::{McpHandler, RequestHandler, ServerInfo};
pub use server::{AppState, ServerConfig, build_router, serve, start_server};
pub use session::{Session, SessionRegistry};
pub use sse::{SseBroadcaster, SseEvent, Subscription};
pub use stdio::serve_stdio;
