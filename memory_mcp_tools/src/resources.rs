//! Read-only memory resources addressed by `memory://{user}/{kind}` URIs.

use crate::client::MemoryApiClient;
use crate::error::ToolError;
use crate::provider::{ResourceDescriptor, json_resource_contents};
use chrono::{SecondsFormat, Utc};
use serde_json::json;

const JSON_MIME: &str = "application/json";
const RECENT_MEMORY_LIMIT: u32 = 10;

/// Which resource a URI refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Context,
    Recent,
    Stats,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [Self::Context, Self::Recent, Self::Stats];

    fn path(self) -> &'static str {
        match self {
            Self::Context => "context",
            Self::Recent => "recent",
            Self::Stats => "stats",
        }
    }

    pub fn uri(self, user_id: &str) -> String {
        format!("memory://{}/{}", user_id, self.path())
    }

    /// Resolve a URI for `user_id`; URIs for other users are unknown.
    pub fn from_uri(uri: &str, user_id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.uri(user_id) == uri)
    }

    pub fn descriptor(self, user_id: &str) -> ResourceDescriptor {
        let (name, description) = match self {
            Self::Context => (
                "Quinn's Memory Context",
                "Real-time user memory context from Railway API",
            ),
            Self::Recent => ("Recent Memories", "Latest memories from Quinn's memory system"),
            Self::Stats => (
                "Memory Statistics",
                "Usage statistics for Quinn's memory system",
            ),
        };
        ResourceDescriptor {
            uri: self.uri(user_id),
            name: name.to_string(),
            description: description.to_string(),
            mime_type: JSON_MIME.to_string(),
        }
    }
}

pub fn resource_descriptors(user_id: &str) -> Vec<ResourceDescriptor> {
    ResourceKind::ALL
        .into_iter()
        .map(|kind| kind.descriptor(user_id))
        .collect()
}

pub async fn read_resource(
    client: &MemoryApiClient,
    kind: ResourceKind,
) -> Result<serde_json::Value, ToolError> {
    let uri = kind.uri(client.default_user_id());
    match kind {
        ResourceKind::Context => {
            let response = client.get_user_context(None).await;
            if !response.success {
                return Err(ToolError::new(format!(
                    "Failed to get context: {}",
                    response.error_text()
                )));
            }
            json_resource_contents(&uri, &json!(response.data))
        }
        ResourceKind::Recent => {
            let response = client.search_memory("", RECENT_MEMORY_LIMIT).await;
            if !response.success {
                return Err(ToolError::new(format!(
                    "Failed to get recent memories: {}",
                    response.error_text()
                )));
            }
            json_resource_contents(&uri, &json!(response.data))
        }
        // Stats are best-effort: either half may be missing.
        ResourceKind::Stats => {
            let context = client.get_user_context(None).await;
            let health = client.health_check().await;
            let stats = json!({
                "context": context.data,
                "health": health.data,
                "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            });
            json_resource_contents(&uri, &stats)
        }
    }
}
