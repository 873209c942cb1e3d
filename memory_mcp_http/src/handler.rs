//! MCP method table.
//!
//! [`RequestHandler`] is the seam between the JSON-RPC dispatcher and the
//! code that gives methods meaning. [`McpHandler`] is the production
//! implementation: a fixed table of MCP methods, with `tools/call` and
//! `resources/read` delegated to a [`ToolProvider`].

use crate::error::HandlerError;
use async_trait::async_trait;
use memory_mcp_tools::ToolProvider;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, error};

/// MCP protocol revision reported by `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Resolves a validated JSON-RPC method call to a result.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, method: &str, params: Value) -> Result<Value, HandlerError>;
}

/// Name and version reported in `initialize`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: "quinn-zep-mcp-server".to_string(),
            version: "1.0.0".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CallToolParams {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct ReadResourceParams {
    #[serde(default)]
    uri: Option<String>,
}

pub struct McpHandler {
    provider: Arc<dyn ToolProvider>,
    server_info: ServerInfo,
}

impl McpHandler {
    pub fn new(provider: Arc<dyn ToolProvider>, server_info: ServerInfo) -> Self {
        Self {
            provider,
            server_info,
        }
    }

    fn initialize(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {},
                "resources": {},
                "prompts": {},
            },
            "serverInfo": {
                "name": self.server_info.name,
                "version": self.server_info.version,
            },
        })
    }

    async fn call_tool(&self, params: Value) -> Result<Value, HandlerError> {
        let params: CallToolParams = serde_json::from_value(params)
            .map_err(|e| HandlerError::new(format!("Invalid tools/call params: {}", e)))?;
        let name = params
            .name
            .ok_or_else(|| HandlerError::new("Missing tool name"))?;
        Ok(self.provider.call_tool(&name, params.arguments).await?)
    }

    async fn read_resource(&self, params: Value) -> Result<Value, HandlerError> {
        let params: ReadResourceParams = serde_json::from_value(params)
            .map_err(|e| HandlerError::new(format!("Invalid resources/read params: {}", e)))?;
        let uri = params
            .uri
            .ok_or_else(|| HandlerError::new("Missing resource uri"))?;
        Ok(self.provider.read_resource(&uri).await?)
    }
}

#[async_trait]
impl RequestHandler for McpHandler {
    async fn handle(&self, method: &str, params: Value) -> Result<Value, HandlerError> {
        debug!(method = method, "Handling MCP method");
        let result = match method {
            "initialize" => Ok(self.initialize()),
            "tools/list" => Ok(json!({ "tools": self.provider.tools() })),
            "tools/call" => self.call_tool(params).await,
            "resources/list" => Ok(json!({ "resources": self.provider.resources() })),
            "resources/read" => self.read_resource(params).await,
            "prompts/list" => Ok(json!({ "prompts": [] })),
            "prompts/get" => Err(HandlerError::new("No prompts available")),
            "ping" => Ok(json!({ "pong": true })),
            other => Err(HandlerError::new(format!("Unknown method: {}", other))),
        };

        if let Err(e) = &result {
            error!(method = method, error = %e, "MCP handler error");
        }
        result
    }
}
