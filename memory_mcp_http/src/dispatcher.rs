//! JSON-RPC 2.0 envelope validation and dispatch.
//!
//! The dispatcher never fails: every input, including bodies that are not
//! JSON at all, produces a well-formed [`JsonRpcResponse`] together with the
//! HTTP status it should be sent with.
//!
//! | Situation | Code | HTTP |
//! |---|---|---|
//! | body is not JSON | -32700 | 400 |
//! | `jsonrpc` missing or not `"2.0"` | -32600 | 400 |
//! | `method` missing, not a string, or empty | -32600 | 400 |
//! | no handler wired | -32603 | 503 |
//! | handler failed (including unknown method) | -32603 | 500 |
//! | success | n/a | 200 |

use crate::handler::RequestHandler;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const INTERNAL_ERROR: i32 = -32603;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

/// A JSON-RPC response. Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn failure(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
            id,
        }
    }
}

/// Outcome of dispatching one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    pub status: StatusCode,
    pub response: JsonRpcResponse,
    /// The request's method, when it was a string.
    pub method: Option<String>,
}

impl Dispatched {
    fn error(status: StatusCode, id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            status,
            response: JsonRpcResponse::failure(id, code, message),
            method: None,
        }
    }

    fn with_method(mut self, method: &str) -> Self {
        self.method = Some(method.to_string());
        self
    }
}

/// Validates envelopes and forwards well-formed calls to the injected
/// [`RequestHandler`].
#[derive(Clone, Default)]
pub struct JsonRpcDispatcher {
    handler: Option<Arc<dyn RequestHandler>>,
}

impl JsonRpcDispatcher {
    pub fn new(handler: Arc<dyn RequestHandler>) -> Self {
        Self {
            handler: Some(handler),
        }
    }

    /// A dispatcher with no handler wired; every valid call answers 503.
    pub fn unconfigured() -> Self {
        Self { handler: None }
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// Parse `body` as JSON and dispatch it.
    pub async fn handle_bytes(&self, body: &[u8]) -> Dispatched {
        match serde_json::from_slice::<Value>(body) {
            Ok(request) => self.handle(&request).await,
            Err(e) => {
                debug!(error = %e, "Rejecting unparseable JSON-RPC body");
                Dispatched::error(
                    StatusCode::BAD_REQUEST,
                    Value::Null,
                    PARSE_ERROR,
                    format!("Parse error: {}", e),
                )
            }
        }
    }

    pub async fn handle(&self, request: &Value) -> Dispatched {
        let id = request.get("id").cloned().unwrap_or(Value::Null);

        if request.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Dispatched::error(
                StatusCode::BAD_REQUEST,
                id,
                INVALID_REQUEST,
                "Invalid Request: Missing or invalid jsonrpc version",
            );
        }

        let method = match request.get("method") {
            Some(Value::String(m)) if !m.is_empty() => m.as_str(),
            Some(Value::String(_)) => {
                return Dispatched::error(
                    StatusCode::BAD_REQUEST,
                    id,
                    INVALID_REQUEST,
                    "Invalid Request: Method must not be empty",
                )
                .with_method("");
            }
            Some(_) => {
                return Dispatched::error(
                    StatusCode::BAD_REQUEST,
                    id,
                    INVALID_REQUEST,
                    "Invalid Request: Method must be a string",
                );
            }
            None => {
                return Dispatched::error(
                    StatusCode::BAD_REQUEST,
                    id,
                    INVALID_REQUEST,
                    "Invalid Request: Missing method",
                );
            }
        };

        let Some(handler) = &self.handler else {
            warn!(method = method, "No request handler configured");
            return Dispatched::error(
                StatusCode::SERVICE_UNAVAILABLE,
                id,
                INTERNAL_ERROR,
                "Internal error: No request handler available",
            )
            .with_method(method);
        };

        let params = match request.get("params") {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(params) => params.clone(),
        };

        debug!(method = method, id = %id, "Dispatching JSON-RPC request");
        let dispatched = match handler.handle(method, params).await {
            Ok(result) => Dispatched {
                status: StatusCode::OK,
                response: JsonRpcResponse::success(id, result),
                method: None,
            },
            Err(e) => Dispatched::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                id,
                INTERNAL_ERROR,
                format!("Internal error: {}", e),
            ),
        };
        dispatched.with_method(method)
    }
}
