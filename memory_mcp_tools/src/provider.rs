//! The interface between the protocol layer and tool/resource implementations.

use crate::error::ToolError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Descriptor advertised by `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Descriptor advertised by `resources/list`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    pub uri: String,
    pub name: String,
    pub description: String,
    pub mime_type: String,
}

/// Registry of callable tools and readable resources.
///
/// Results are opaque JSON handed back to the client unchanged. Failures carry
/// a message only; there is no error taxonomy at this boundary.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    fn tools(&self) -> Vec<ToolDescriptor>;

    fn resources(&self) -> Vec<ResourceDescriptor>;

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, ToolError>;

    async fn read_resource(&self, uri: &str) -> Result<Value, ToolError>;
}

/// Wrap plain text in the tool result shape: `{content: [{type: "text", text}]}`.
pub fn text_content(text: impl Into<String>) -> Value {
    json!({
        "content": [{
            "type": "text",
            "text": text.into(),
        }]
    })
}

/// Wrap a JSON document in the resource read shape.
pub fn json_resource_contents(uri: &str, data: &Value) -> Result<Value, ToolError> {
    let text = serde_json::to_string_pretty(data)
        .map_err(|e| ToolError::new(format!("Failed to encode resource: {}", e)))?;
    Ok(json!({
        "contents": [{
            "uri": uri,
            "mimeType": "application/json",
            "text": text,
        }]
    }))
}
