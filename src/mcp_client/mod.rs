//! MCP Client: the tool backend facade and its JSON-RPC plumbing.
//!
//! This module handles:
//! - The [`ToolBackend`] trait every tool provider implements
//! - [`BackendSet`], several backends merged behind one `ToolBackend`
//! - Spawning an MCP server child process and the `initialize` handshake
//! - JSON-RPC 2.0 communication over line-delimited stdio
//! - Tool call validation against the cached tool registry

pub mod aggregate;
pub mod backend;
pub mod client;
pub mod errors;
pub mod lifecycle;
pub mod registry;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use aggregate::BackendSet;
pub use backend::{document_uri, ToolBackend, DOCUMENT_INDEX_URI};
pub use client::McpClient;
pub use errors::McpError;
pub use registry::ToolRegistry;
pub use types::{McpToolDefinition, PromptArgument, PromptDefinition, ServerConfig, ToolCallResult};
