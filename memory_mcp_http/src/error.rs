//! Error types for the HTTP server

use memory_mcp_tools::ToolError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP server error: {0}")]
    HttpServer(String),
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// Failure returned by a [`crate::RequestHandler`].
///
/// Only the message survives; the dispatcher flattens every handler failure
/// into a single JSON-RPC error code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HandlerError(String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<ToolError> for HandlerError {
    fn from(err: ToolError) -> Self {
        Self(err.message().to_string())
    }
}
