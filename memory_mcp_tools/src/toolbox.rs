//! [`ToolProvider`] backed by the memory API.

use crate::client::MemoryApiClient;
use crate::error::ToolError;
use crate::provider::{ResourceDescriptor, ToolDescriptor, ToolProvider};
use crate::resources::{self, ResourceKind};
use crate::tools;
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

pub struct MemoryToolbox {
    client: MemoryApiClient,
}

impl MemoryToolbox {
    pub fn new(client: MemoryApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolProvider for MemoryToolbox {
    fn tools(&self) -> Vec<ToolDescriptor> {
        tools::tool_descriptors(self.client.default_user_id())
    }

    fn resources(&self) -> Vec<ResourceDescriptor> {
        resources::resource_descriptors(self.client.default_user_id())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        debug!(tool = name, "Calling tool");
        match name {
            tools::STORE_MEMORY => tools::store_memory(&self.client, arguments).await,
            tools::SEARCH_MEMORY => tools::search_memory(&self.client, arguments).await,
            tools::GET_USER_CONTEXT => tools::get_user_context(&self.client, arguments).await,
            tools::ADD_FACT => tools::add_fact(&self.client, arguments).await,
            tools::SEARCH_FACTS => tools::search_facts(&self.client, arguments).await,
            other => Err(ToolError::new(format!("Unknown tool: {}", other))),
        }
    }

    async fn read_resource(&self, uri: &str) -> Result<Value, ToolError> {
        debug!(uri = uri, "Reading resource");
        match ResourceKind::from_uri(uri, self.client.default_user_id()) {
            Some(kind) => resources::read_resource(&self.client, kind).await,
            None => Err(ToolError::new(format!("Unknown resource: {}", uri))),
        }
    }
}
