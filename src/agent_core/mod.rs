//! Agent Core: the conversation/tool-call orchestration layer.
//!
//! Submodules:
//! - `types`: turns and turn outcomes shared by every layer
//! - `conversation`: the append-only transcript
//! - `command_resolver`: `@doc` mentions and `/prompt` commands
//! - `tool_router`: executes a batch of tool calls against the backend
//! - `orchestrator`: the per-turn state machine
//! - `tokens`: size estimation and UTF-8 safe truncation
//! - `errors`: errors that end a turn

pub mod command_resolver;
pub mod conversation;
pub mod errors;
pub mod orchestrator;
pub mod tokens;
pub mod tool_router;
pub mod types;

// Re-exports for convenience
pub use command_resolver::{CommandResolver, InputKind, ResolvedInput};
pub use conversation::Conversation;
pub use errors::AgentError;
pub use orchestrator::{Orchestrator, DEFAULT_MAX_TOOL_ROUNDS};
pub use tool_router::ToolRouter;
pub use types::{Turn, TurnOutcome, TurnRole, TurnStatus};
