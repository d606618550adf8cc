//! Inference client: OpenAI-compatible API client for local LLM inference.
//!
//! This module handles all communication with the model endpoint:
//! - The `ModelGateway` seam the orchestrator calls through
//! - Non-streaming chat completions against any OpenAI-compatible server
//! - Tool call parsing (native JSON + JSON-in-prompt formats)
//! - Model configuration (the `model` section of `docchat.yaml`)

pub mod client;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod response;
pub mod tool_call_parser;
pub mod types;

// Re-exports for convenience
pub use client::InferenceClient;
pub use config::{ModelConfig, ToolCallFormat};
pub use errors::InferenceError;
pub use gateway::ModelGateway;
pub use types::{ModelReply, ToolCall};
