//! # Memory MCP Tools
//!
//! Tool and resource implementations served by `memory_mcp_http`.
//!
//! The protocol layer only sees the [`ToolProvider`] trait: a table of tool
//! and resource descriptors plus two async entry points (`call_tool`,
//! `read_resource`). [`MemoryToolbox`] implements it on top of
//! [`MemoryApiClient`], a small JSON client for the remote memory API.
//!
//! ## Tools
//!
//! * `store-memory`, `search-memory`, `get-user-context`
//! * `add-fact`, `search-facts`
//!
//! ## Resources
//!
//! * `memory://{user}/context`, `memory://{user}/recent`, `memory://{user}/stats`

pub mod client;
pub mod error;
pub mod provider;
pub mod resources;
pub mod toolbox;
pub mod tools;
pub mod types;

pub use client::{MemoryApiClient, MemoryApiConfig};
pub use error::{MemoryApiError, Result, ToolError};
pub use provider::{ResourceDescriptor, ToolDescriptor, ToolProvider, text_content};
pub use toolbox::MemoryToolbox;
