//! Wire types of the memory API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Envelope every memory API endpoint answers with.
///
/// Transport failures are folded into the same shape (`success: false`)
/// by [`crate::MemoryApiClient`], so callers only ever inspect this struct.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            message: None,
        }
    }

    /// Error text for a failed response, falling back to `message`.
    pub fn error_text(&self) -> &str {
        self.error
            .as_deref()
            .or(self.message.as_deref())
            .unwrap_or("Unknown error")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MemoryItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SearchResult {
    #[serde(default)]
    pub memories: Vec<MemoryItem>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Fact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub fact: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FactSearchResult {
    #[serde(default)]
    pub facts: Vec<Fact>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub query: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let response: ApiResponse<SearchResult> =
            serde_json::from_value(json!({"success": true, "data": {"memories": []}})).unwrap();
        assert!(response.success);
        let data = response.data.unwrap();
        assert_eq!(data.total, 0);
        assert!(data.query.is_empty());
    }

    #[test]
    fn absent_data_is_none_for_payloads_without_default() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Receipt {
            id: String,
        }

        let response: ApiResponse<Receipt> =
            serde_json::from_value(json!({"success": false, "error": "down"})).unwrap();
        assert!(response.data.is_none());

        let response: ApiResponse<Receipt> =
            serde_json::from_value(json!({"success": true, "data": {"id": "m-1"}})).unwrap();
        assert_eq!(response.data, Some(Receipt { id: "m-1".into() }));
    }

    #[test]
    fn error_text_prefers_error_over_message() {
        let response: ApiResponse<Value> = serde_json::from_value(json!({
            "success": false,
            "error": "boom",
            "message": "ignored"
        }))
        .unwrap();
        assert_eq!(response.error_text(), "boom");

        let response: ApiResponse<Value> =
            serde_json::from_value(json!({"success": false, "message": "fallback"})).unwrap();
        assert_eq!(response.error_text(), "fallback");

        let response: ApiResponse<Value> = serde_json::from_value(json!({})).unwrap();
        assert!(!response.success);
        assert_eq!(response.error_text(), "Unknown error");
    }
}
