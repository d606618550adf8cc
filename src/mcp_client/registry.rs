//! Cached tool catalog for one backend, with a structural argument check
//! run before every dispatch.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::errors::McpError;
use super::types::McpToolDefinition;

/// Tool definitions keyed by name. Name order keeps the catalog sent to the
/// model stable between rounds.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    by_name: BTreeMap<String, McpToolDefinition>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tools(tools: Vec<McpToolDefinition>) -> Self {
        let mut registry = Self::new();
        registry.replace_all(tools);
        registry
    }

    /// Swap in a fresh `tools/list` result.
    pub fn replace_all(&mut self, tools: Vec<McpToolDefinition>) {
        self.by_name = tools.into_iter().map(|t| (t.name.clone(), t)).collect();
    }

    pub fn get(&self, name: &str) -> Option<&McpToolDefinition> {
        self.by_name.get(name)
    }

    pub fn all_tools(&self) -> Vec<McpToolDefinition> {
        self.by_name.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Check `arguments` against the declared parameter schema: an object,
    /// every `required` key present, and declared JSON types respected.
    /// Keys the schema does not mention pass through.
    pub fn check_arguments(&self, tool: &str, arguments: &Value) -> Result<(), McpError> {
        let definition = self.get(tool).ok_or_else(|| McpError::UnknownTool {
            name: tool.to_string(),
        })?;
        let invalid = |reason: String| McpError::InvalidArguments {
            tool: tool.to_string(),
            reason,
        };

        let args = arguments
            .as_object()
            .ok_or_else(|| invalid("arguments must be a JSON object".into()))?;
        let schema = &definition.params_schema;

        let missing = schema
            .get("required")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .find(|key| !args.contains_key(*key));
        if let Some(key) = missing {
            return Err(invalid(format!("missing required field '{key}'")));
        }

        let empty = Map::new();
        let properties = schema
            .get("properties")
            .and_then(Value::as_object)
            .unwrap_or(&empty);
        for (key, value) in args {
            let Some(expected) = properties
                .get(key)
                .and_then(|p| p.get("type"))
                .and_then(Value::as_str)
            else {
                continue;
            };
            if !has_json_type(value, expected) {
                return Err(invalid(format!("field '{key}' must be of type {expected}")));
            }
        }

        Ok(())
    }
}

/// JSON Schema primitive type test. Unknown type names are accepted.
fn has_json_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}
