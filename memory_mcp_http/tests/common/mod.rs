//! Shared test utilities for HTTP integration tests.
//!
//! Servers run in-process on a port picked by the OS, backed by a
//! [`StubProvider`] so no memory API is needed.

// Allow dead_code - these are test utilities, and rustc can't see usage across test crates
#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use memory_mcp_http::{JsonRpcDispatcher, McpHandler, ServerConfig, ServerInfo, serve};
use memory_mcp_tools::{ResourceDescriptor, ToolDescriptor, ToolError, ToolProvider, text_content};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const SESSION_HEADER: &str = "x-session-id";

/// Tool provider with a single `echo` tool and no backend.
pub struct StubProvider;

#[async_trait]
impl ToolProvider for StubProvider {
    fn tools(&self) -> Vec<ToolDescriptor> {
        vec![ToolDescriptor {
            name: "echo".into(),
            description: "Echo the arguments back".into(),
            input_schema: json!({"type": "object"}),
        }]
    }

    fn resources(&self) -> Vec<ResourceDescriptor> {
        vec![]
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        match name {
            "echo" => Ok(text_content(arguments.to_string())),
            other => Err(ToolError::new(format!("Unknown tool: {}", other))),
        }
    }

    async fn read_resource(&self, uri: &str) -> Result<Value, ToolError> {
        Err(ToolError::new(format!("Unknown resource: {}", uri)))
    }
}

/// A server running on a background task.
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<memory_mcp_http::Result<()>>>,
}

impl TestServer {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    /// Trigger graceful shutdown and wait for the server to finish.
    pub async fn stop(mut self) -> memory_mcp_http::Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.handle.take() {
            Some(handle) => tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .expect("server did not shut down in time")
                .expect("server task panicked"),
            None => Ok(()),
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        ..ServerConfig::default()
    }
}

/// Spawn a server with the stub provider wired in.
pub async fn spawn_test_server(config: ServerConfig) -> TestServer {
    let handler = McpHandler::new(Arc::new(StubProvider), ServerInfo::default());
    spawn_with_dispatcher(config, JsonRpcDispatcher::new(Arc::new(handler))).await
}

pub async fn spawn_with_dispatcher(config: ServerConfig, dispatcher: JsonRpcDispatcher) -> TestServer {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Failed to read local addr");
    let (tx, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(serve(listener, config, dispatcher, async move {
        let _ = rx.await;
    }));

    TestServer {
        addr,
        shutdown: Some(tx),
        handle: Some(handle),
    }
}

/// Atomic request ID counter for JSON-RPC
static REQUEST_ID: AtomicU64 = AtomicU64::new(1);

pub fn rpc(method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": REQUEST_ID.fetch_add(1, Ordering::SeqCst),
        "method": method,
        "params": params,
    })
}

/// Incremental reader of `data:` frames from an SSE response.
pub struct SseReader {
    stream: BoxStream<'static, reqwest::Result<Bytes>>,
    buffer: String,
}

impl SseReader {
    pub fn new(response: reqwest::Response) -> Self {
        Self {
            stream: response.bytes_stream().boxed(),
            buffer: String::new(),
        }
    }

    /// Next `data:` frame parsed as JSON, or `None` when the stream ends or
    /// nothing arrives within `wait`.
    pub async fn next_event(&mut self, wait: Duration) -> Option<Value> {
        tokio::time::timeout(wait, self.read_event()).await.ok().flatten()
    }

    async fn read_event(&mut self) -> Option<Value> {
        loop {
            if let Some(end) = self.buffer.find("\n\n") {
                let frame: String = self.buffer.drain(..end + 2).collect();
                let data: String = frame
                    .lines()
                    .filter_map(|line| line.strip_prefix("data:"))
                    .map(str::trim_start)
                    .collect::<Vec<_>>()
                    .join("\n");
                if data.is_empty() {
                    continue;
                }
                return serde_json::from_str(&data).ok();
            }

            let chunk = self.stream.next().await?.ok()?;
            self.buffer.push_str(&String::from_utf8_lossy(&chunk));
        }
    }

    /// Skip frames until one of `event_type` arrives.
    pub async fn next_of_type(&mut self, event_type: &str, wait: Duration) -> Option<Value> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let event = self.next_event(remaining).await?;
            if event["type"] == event_type {
                return Some(event);
            }
        }
    }
}
