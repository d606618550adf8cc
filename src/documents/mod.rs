//! Documents: the sample document backend.
//!
//! - `store`: shared in-memory `doc_id → content` map
//! - `backend`: `ToolBackend` implementation (tools, resources, prompts)
//! - `prompts`: prompt templates keyed by name
//! - `errors`: store error types

pub mod backend;
pub mod errors;
pub mod prompts;
pub mod store;

pub use backend::DocumentBackend;
pub use errors::DocumentError;
pub use store::DocumentStore;
