//! Several tool backends presented as one.
//!
//! The first member is the primary (document) backend. Tools and prompts of
//! every member are merged; a name offered by two members belongs to the
//! earlier one. Calls are routed to the owning member through a name map
//! that `list_tools` / `list_prompts` refresh.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::backend::ToolBackend;
use super::errors::McpError;
use super::types::{McpToolDefinition, PromptDefinition, ResourceDefinition, ToolCallResult};
use crate::agent_core::types::Turn;
use crate::inference::types::ToolCall;

pub struct BackendSet {
    members: Vec<(String, Arc<dyn ToolBackend>)>,
    /// `tool name → member index`.
    tool_owner: RwLock<HashMap<String, usize>>,
    /// `prompt name → member index`.
    prompt_owner: RwLock<HashMap<String, usize>>,
}

impl BackendSet {
    /// `primary` answers resource reads first and owns names it shares with
    /// the extras.
    pub fn new(primary: (String, Arc<dyn ToolBackend>)) -> Self {
        Self {
            members: vec![primary],
            tool_owner: RwLock::new(HashMap::new()),
            prompt_owner: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_member(mut self, name: impl Into<String>, backend: Arc<dyn ToolBackend>) -> Self {
        self.members.push((name.into(), backend));
        self
    }

    pub fn member_names(&self) -> Vec<&str> {
        self.members.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Owner of a tool, refreshing the map once if the name is unknown.
    async fn tool_member(&self, tool: &str) -> Result<Option<usize>, McpError> {
        if let Some(&i) = self.tool_owner.read().await.get(tool) {
            return Ok(Some(i));
        }
        self.list_tools().await?;
        Ok(self.tool_owner.read().await.get(tool).copied())
    }

    async fn prompt_member(&self, prompt: &str) -> Result<Option<usize>, McpError> {
        if let Some(&i) = self.prompt_owner.read().await.get(prompt) {
            return Ok(Some(i));
        }
        self.list_prompts().await?;
        Ok(self.prompt_owner.read().await.get(prompt).copied())
    }
}

/// Merge per-member lists, first owner wins. Returns the merged list and
/// the owner map.
fn merge<T>(
    per_member: Vec<(usize, Vec<T>)>,
    name_of: impl Fn(&T) -> &str,
    kind: &str,
) -> (Vec<T>, HashMap<String, usize>) {
    let mut owners = HashMap::new();
    let mut merged = Vec::new();
    for (index, items) in per_member {
        for item in items {
            let name = name_of(&item).to_string();
            if let Some(&owner) = owners.get(&name) {
                tracing::warn!(
                    kind,
                    name = %name,
                    owner,
                    shadowed = index,
                    "duplicate name across backends"
                );
                continue;
            }
            owners.insert(name, index);
            merged.push(item);
        }
    }
    (merged, owners)
}

#[async_trait]
impl ToolBackend for BackendSet {
    async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpError> {
        let mut per_member = Vec::with_capacity(self.members.len());
        for (i, (_, backend)) in self.members.iter().enumerate() {
            per_member.push((i, backend.list_tools().await?));
        }
        let (tools, owners) = merge(per_member, |t| t.name.as_str(), "tool");
        *self.tool_owner.write().await = owners;
        Ok(tools)
    }

    async fn call_tool(&self, call: &ToolCall) -> Result<ToolCallResult, McpError> {
        match self.tool_member(&call.name).await? {
            Some(i) => {
                let (member, backend) = &self.members[i];
                tracing::debug!(tool = %call.name, backend = %member, "routing tool call");
                backend.call_tool(call).await
            }
            None => Ok(ToolCallResult {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                content: McpError::UnknownTool {
                    name: call.name.clone(),
                }
                .to_string(),
                is_error: true,
                execution_time_ms: 0,
            }),
        }
    }

    async fn list_resources(&self) -> Result<Vec<ResourceDefinition>, McpError> {
        let mut resources = Vec::new();
        for (_, backend) in &self.members {
            resources.extend(backend.list_resources().await?);
        }
        Ok(resources)
    }

    /// Members are asked in order; the first that has the resource answers.
    async fn read_resource(&self, uri: &str) -> Result<String, McpError> {
        for (_, backend) in &self.members {
            match backend.read_resource(uri).await {
                Err(McpError::ResourceNotFound { .. }) => continue,
                other => return other,
            }
        }
        Err(McpError::ResourceNotFound {
            uri: uri.to_string(),
        })
    }

    async fn list_prompts(&self) -> Result<Vec<PromptDefinition>, McpError> {
        let mut per_member = Vec::with_capacity(self.members.len());
        for (i, (_, backend)) in self.members.iter().enumerate() {
            per_member.push((i, backend.list_prompts().await?));
        }
        let (prompts, owners) = merge(per_member, |p| p.name.as_str(), "prompt");
        *self.prompt_owner.write().await = owners;
        Ok(prompts)
    }

    async fn get_prompt(
        &self,
        name: &str,
        arguments: &HashMap<String, String>,
    ) -> Result<Vec<Turn>, McpError> {
        match self.prompt_member(name).await? {
            Some(i) => self.members[i].1.get_prompt(name, arguments).await,
            None => Err(McpError::PromptNotFound {
                name: name.to_string(),
            }),
        }
    }

    async fn shutdown(&self) {
        for (name, backend) in &self.members {
            tracing::debug!(backend = %name, "shutting down backend");
            backend.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::{DocumentBackend, DocumentStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Extra backend with one `weather` tool, one `forecast` prompt and a
    /// clashing `read_doc_contents` tool.
    #[derive(Default)]
    struct WeatherBackend {
        calls: AtomicUsize,
    }

    fn tool(name: &str) -> McpToolDefinition {
        McpToolDefinition {
            name: name.to_string(),
            description: format!("{name} tool"),
            params_schema: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    #[async_trait]
    impl ToolBackend for WeatherBackend {
        async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpError> {
            Ok(vec![tool("weather"), tool("read_doc_contents")])
        }

        async fn call_tool(&self, call: &ToolCall) -> Result<ToolCallResult, McpError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ToolCallResult {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                content: "sunny".into(),
                is_error: false,
                execution_time_ms: 1,
            })
        }

        async fn read_resource(&self, uri: &str) -> Result<String, McpError> {
            Err(McpError::ResourceNotFound { uri: uri.into() })
        }

        async fn list_prompts(&self) -> Result<Vec<PromptDefinition>, McpError> {
            Ok(vec![PromptDefinition {
                name: "forecast".into(),
                description: "Weather forecast".into(),
                arguments: Vec::new(),
            }])
        }

        async fn get_prompt(
            &self,
            _name: &str,
            _arguments: &HashMap<String, String>,
        ) -> Result<Vec<Turn>, McpError> {
            Ok(vec![Turn::user("What is the forecast?")])
        }
    }

    fn set() -> (BackendSet, Arc<WeatherBackend>) {
        let weather = Arc::new(WeatherBackend::default());
        let docs: Arc<dyn ToolBackend> = Arc::new(DocumentBackend::new(DocumentStore::seeded()));
        let set =
            BackendSet::new(("documents".into(), docs)).with_member("weather", weather.clone());
        (set, weather)
    }

    fn call(name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "c1".into(),
            name: name.into(),
            arguments: args,
        }
    }

    #[tokio::test]
    async fn test_tools_and_prompts_are_merged() {
        let (set, _) = set();
        let tools: Vec<_> = set
            .list_tools()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(tools, ["edit_document", "read_doc_contents", "weather"]);

        let prompts: Vec<_> = set
            .list_prompts()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert!(prompts.contains(&"summarize".to_string()));
        assert!(prompts.contains(&"forecast".to_string()));
        assert_eq!(set.member_names(), ["documents", "weather"]);
    }

    #[tokio::test]
    async fn test_calls_route_to_owner() {
        let (set, weather) = set();

        let result = set.call_tool(&call("weather", serde_json::json!({}))).await.unwrap();
        assert_eq!(result.content, "sunny");

        let result = set
            .call_tool(&call("read_doc_contents", serde_json::json!({"doc_id": "plan.md"})))
            .await
            .unwrap();
        assert!(result.content.contains("The plan outlines"));
        assert_eq!(weather.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error_result() {
        let (set, _) = set();
        let result = set.call_tool(&call("teleport", serde_json::json!({}))).await.unwrap();
        assert!(result.is_error);
        assert_eq!(result.tool_call_id, "c1");
    }

    #[tokio::test]
    async fn test_prompts_and_resources_route() {
        let (set, _) = set();
        let turns = set.get_prompt("forecast", &HashMap::new()).await.unwrap();
        assert_eq!(turns, vec![Turn::user("What is the forecast?")]);

        let err = set.get_prompt("nope", &HashMap::new()).await.unwrap_err();
        assert!(matches!(err, McpError::PromptNotFound { .. }));

        let text = set.read_resource("docs://documents/plan.md").await.unwrap();
        assert!(text.contains("The plan outlines"));
        let err = set.read_resource("docs://documents/nope.md").await.unwrap_err();
        assert!(matches!(err, McpError::ResourceNotFound { .. }));
    }
}
