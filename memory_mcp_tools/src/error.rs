//! Error types for the memory tool layer

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MemoryApiError {
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),
    #[error("URL parsing failed: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("Base URL cannot carry a path: {0}")]
    InvalidBaseUrl(String),
    #[error("HTTP {status}: {reason}")]
    Status { status: u16, reason: String },
}

pub type Result<T> = std::result::Result<T, MemoryApiError>;

/// Failure raised by a tool or resource handler.
///
/// Carries only a human-readable message; callers flatten it into whatever
/// error envelope their protocol uses.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ToolError(String);

impl ToolError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(err: serde_json::Error) -> Self {
        Self(format!("Invalid arguments: {}", err))
    }
}
