//! Memory and knowledge-graph tools.
//!
//! Each tool is a descriptor (advertised via `tools/list`) plus a handler
//! that validates its arguments by deserializing them into a typed struct and
//! forwards the call to the memory API.

use crate::client::MemoryApiClient;
use crate::error::ToolError;
use crate::provider::{ToolDescriptor, text_content};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

pub const STORE_MEMORY: &str = "store-memory";
pub const SEARCH_MEMORY: &str = "search-memory";
pub const GET_USER_CONTEXT: &str = "get-user-context";
pub const ADD_FACT: &str = "add-fact";
pub const SEARCH_FACTS: &str = "search-facts";

const DEFAULT_SEARCH_LIMIT: u32 = 10;

/// Descriptors for every tool, in advertisement order.
pub fn tool_descriptors(default_user_id: &str) -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: STORE_MEMORY.to_string(),
            description: "Store a new memory in the memory system via Railway API".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "content": {
                        "type": "string",
                        "description": "The memory content to store",
                    },
                    "metadata": {
                        "type": "object",
                        "description": "Optional metadata for the memory",
                        "additionalProperties": true,
                    },
                },
                "required": ["content"],
            }),
        },
        ToolDescriptor {
            name: SEARCH_MEMORY.to_string(),
            description: "Search memories using the Railway API".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query for memories",
                    },
                    "limit": {
                        "type": "number",
                        "description": "Maximum number of results to return",
                        "default": DEFAULT_SEARCH_LIMIT,
                    },
                },
                "required": ["query"],
            }),
        },
        ToolDescriptor {
            name: GET_USER_CONTEXT.to_string(),
            description: "Get user context via Railway API".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "user_id": {
                        "type": "string",
                        "description": "User ID to get context for",
                        "default": default_user_id,
                    },
                },
            }),
        },
        ToolDescriptor {
            name: ADD_FACT.to_string(),
            description: "Add a fact to the knowledge graph via Railway API".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "fact": {
                        "type": "string",
                        "description": "The fact to add to the knowledge graph",
                    },
                    "category": {
                        "type": "string",
                        "description": "Optional category for the fact",
                    },
                },
                "required": ["fact"],
            }),
        },
        ToolDescriptor {
            name: SEARCH_FACTS.to_string(),
            description: "Search facts in the knowledge graph via Railway API".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query for facts",
                    },
                },
                "required": ["query"],
            }),
        },
    ]
}

#[derive(Debug, Deserialize)]
struct StoreMemoryArgs {
    content: String,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct SearchMemoryArgs {
    query: String,
    #[serde(default = "default_search_limit")]
    limit: u32,
}

fn default_search_limit() -> u32 {
    DEFAULT_SEARCH_LIMIT
}

#[derive(Debug, Deserialize)]
struct GetUserContextArgs {
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AddFactArgs {
    fact: String,
    #[serde(default)]
    category: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchFactsArgs {
    query: String,
}

/// Absent arguments are treated as an empty object.
fn parse_args<T: DeserializeOwned>(arguments: Value) -> Result<T, ToolError> {
    let arguments = if arguments.is_null() {
        Value::Object(Map::new())
    } else {
        arguments
    };
    Ok(serde_json::from_value(arguments)?)
}

fn pretty<T: serde::Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| "null".to_string())
}

pub async fn store_memory(client: &MemoryApiClient, arguments: Value) -> Result<Value, ToolError> {
    let args: StoreMemoryArgs = parse_args(arguments)?;
    let response = client.store_memory(&args.content, args.metadata).await;
    if !response.success {
        return Err(ToolError::new(format!(
            "Failed to store memory: {}",
            response.error_text()
        )));
    }
    Ok(text_content(format!(
        "Memory stored successfully: {}",
        pretty(&response.data)
    )))
}

pub async fn search_memory(
    client: &MemoryApiClient,
    arguments: Value,
) -> Result<Value, ToolError> {
    let args: SearchMemoryArgs = parse_args(arguments)?;
    let response = client.search_memory(&args.query, args.limit).await;
    if !response.success {
        return Err(ToolError::new(format!(
            "Failed to search memories: {}",
            response.error_text()
        )));
    }
    let total = response.data.as_ref().map(|d| d.total).unwrap_or(0);
    Ok(text_content(format!(
        "Found {} memories:\n\n{}",
        total,
        pretty(&response.data)
    )))
}

pub async fn get_user_context(
    client: &MemoryApiClient,
    arguments: Value,
) -> Result<Value, ToolError> {
    let args: GetUserContextArgs = parse_args(arguments)?;
    let response = client.get_user_context(args.user_id.as_deref()).await;
    if !response.success {
        return Err(ToolError::new(format!(
            "Failed to get user context: {}",
            response.error_text()
        )));
    }
    Ok(text_content(format!(
        "User context:\n\n{}",
        pretty(&response.data)
    )))
}

pub async fn add_fact(client: &MemoryApiClient, arguments: Value) -> Result<Value, ToolError> {
    let args: AddFactArgs = parse_args(arguments)?;
    let response = client.add_fact(&args.fact, args.category.as_deref()).await;
    if !response.success {
        return Err(ToolError::new(format!(
            "Failed to add fact: {}",
            response.error_text()
        )));
    }
    Ok(text_content(format!(
        "Fact added successfully: {}",
        pretty(&response.data)
    )))
}

pub async fn search_facts(client: &MemoryApiClient, arguments: Value) -> Result<Value, ToolError> {
    let args: SearchFactsArgs = parse_args(arguments)?;
    let response = client.search_facts(&args.query).await;
    if !response.success {
        return Err(ToolError::new(format!(
            "Failed to search facts: {}",
            response.error_text()
        )));
    }
    let total = response.data.as_ref().map(|d| d.total).unwrap_or(0);
    Ok(text_content(format!(
        "Found {} facts:\n\n{}",
        total,
        pretty(&response.data)
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptors_cover_all_tools_in_order() {
        let names: Vec<_> = tool_descriptors("quinn_may")
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(
            names,
            vec![STORE_MEMORY, SEARCH_MEMORY, GET_USER_CONTEXT, ADD_FACT, SEARCH_FACTS]
        );
    }

    #[test]
    fn user_context_schema_advertises_default_user() {
        let tools = tool_descriptors("someone");
        let schema = &tools[2].input_schema;
        assert_eq!(schema["properties"]["user_id"]["default"], "someone");
    }

    #[test]
    fn search_limit_defaults_to_ten() {
        let args: SearchMemoryArgs = parse_args(json!({"query": "x"})).unwrap();
        assert_eq!(args.limit, 10);
    }

    #[test]
    fn null_arguments_parse_as_empty_object() {
        let args: GetUserContextArgs = parse_args(Value::Null).unwrap();
        assert!(args.user_id.is_none());
    }

    #[test]
    fn missing_required_argument_is_reported() {
        let err = parse_args::<AddFactArgs>(json!({"category": "x"})).unwrap_err();
        assert!(err.message().starts_with("Invalid arguments:"));
        assert!(err.message().contains("fact"));
    }
}
