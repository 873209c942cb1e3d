//! HTTP client for the remote memory API.

use crate::error::{MemoryApiError, Result};
use crate::types::{ApiResponse, Fact, FactSearchResult, MemoryItem, SearchResult};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value, json};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_MEMORY_API_URL: &str = "https://quinn-memory-api-production.up.railway.app";
pub const DEFAULT_USER_ID: &str = "quinn_may";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for [`MemoryApiClient`].
#[derive(Debug, Clone)]
pub struct MemoryApiConfig {
    /// Base URL of the memory API; endpoint segments are appended to its path.
    pub base_url: String,
    /// User every memory and fact is scoped to.
    pub default_user_id: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for MemoryApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_MEMORY_API_URL.to_string(),
            default_user_id: DEFAULT_USER_ID.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Thin JSON client for the memory API.
///
/// Every call returns an [`ApiResponse`]; transport errors and non-2xx
/// statuses are logged and folded into `success: false`. Nothing is retried.
#[derive(Debug, Clone)]
pub struct MemoryApiClient {
    client: reqwest::Client,
    base_url: Url,
    default_user_id: String,
}

impl MemoryApiClient {
    pub fn new(config: MemoryApiConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(MemoryApiError::InvalidBaseUrl(config.base_url));
        }
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url,
            default_user_id: config.default_user_id,
        })
    }

    pub fn default_user_id(&self) -> &str {
        &self.default_user_id
    }

    pub async fn store_memory(
        &self,
        content: &str,
        metadata: Option<Map<String, Value>>,
    ) -> ApiResponse<MemoryItem> {
        let body = json!({
            "content": content,
            "metadata": metadata,
            "user_id": self.default_user_id,
        });
        self.post(&["add_memory"], &body).await
    }

    pub async fn search_memory(&self, query: &str, limit: u32) -> ApiResponse<SearchResult> {
        let body = json!({
            "query": query,
            "limit": limit,
            "user_id": self.default_user_id,
        });
        self.post(&["search"], &body).await
    }

    /// Fetch the context for `user_id`, or for the default user when `None`.
    ///
    /// The id is sent as a single escaped path segment.
    pub async fn get_user_context(&self, user_id: Option<&str>) -> ApiResponse<Value> {
        let user_id = user_id.unwrap_or(&self.default_user_id);
        if matches!(user_id, "" | "." | "..") {
            return ApiResponse::failure(format!("Invalid user id: {:?}", user_id));
        }
        self.get(&["context", user_id]).await
    }

    pub async fn add_fact(&self, fact: &str, category: Option<&str>) -> ApiResponse<Fact> {
        let body = json!({
            "fact": fact,
            "category": category,
            "user_id": self.default_user_id,
        });
        self.post(&["graph", "add"], &body).await
    }

    pub async fn search_facts(&self, query: &str) -> ApiResponse<FactSearchResult> {
        let body = json!({
            "query": query,
            "user_id": self.default_user_id,
        });
        self.post(&["graph", "search"], &body).await
    }

    pub async fn health_check(&self) -> ApiResponse<Value> {
        self.get(&["health"]).await
    }

    /// Base URL with `segments` appended, each percent-encoded on its own.
    fn endpoint_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| MemoryApiError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> ApiResponse<T> {
        match self.endpoint_url(segments) {
            Ok(url) => self.execute(url.path(), self.client.get(url.clone())).await,
            Err(e) => ApiResponse::failure(e.to_string()),
        }
    }

    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> ApiResponse<T> {
        match self.endpoint_url(segments) {
            Ok(url) => {
                self.execute(url.path(), self.client.post(url.clone()).json(body))
                    .await
            }
            Err(e) => ApiResponse::failure(e.to_string()),
        }
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> ApiResponse<T> {
        debug!(endpoint = endpoint, "Calling memory API");
        match Self::send(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(endpoint = endpoint, error = %e, "Memory API request failed");
                ApiResponse::failure(e.to_string())
            }
        }
    }

    async fn send<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<ApiResponse<T>> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MemoryApiError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }
        Ok(response.json::<ApiResponse<T>>().await?)
    }
}
