//! Orchestrator: drives one user turn to a final answer.
//!
//! State machine per turn:
//! 1. **AwaitingUserInput**: resolve the line, append its turns
//! 2. **ModelThinking**: send the full transcript and tool catalog
//! 3. **ExecutingTools**: run the requested calls, commit the round, go to 2
//! 4. **Done**: final answer appended and returned
//!
//! The transcript persists across turns; the state machine does not. At most
//! `max_tool_rounds` rounds run per turn. A model that still wants tools
//! after that gets a synthesized assistant turn instead.

use std::sync::Arc;
use std::time::Instant;

use crate::inference::gateway::ModelGateway;
use crate::inference::types::ModelReply;
use crate::mcp_client::backend::ToolBackend;

use super::command_resolver::CommandResolver;
use super::conversation::Conversation;
use super::errors::AgentError;
use super::tool_router::ToolRouter;
use super::types::{Turn, TurnOutcome, TurnStatus};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Default ceiling on tool rounds within one user turn.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 10;

// ─── Orchestrator ───────────────────────────────────────────────────────────

pub struct Orchestrator {
    gateway: Arc<dyn ModelGateway>,
    backend: Arc<dyn ToolBackend>,
    router: ToolRouter,
    max_tool_rounds: usize,
    conversation: Conversation,
}

impl Orchestrator {
    pub fn new(gateway: Arc<dyn ModelGateway>, backend: Arc<dyn ToolBackend>) -> Self {
        Self {
            gateway,
            backend,
            router: ToolRouter::default(),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            conversation: Conversation::new(),
        }
    }

    /// Set the tool-round ceiling. Zero is treated as one.
    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds.max(1);
        self
    }

    pub fn with_router(mut self, router: ToolRouter) -> Self {
        self.router = router;
        self
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn backend(&self) -> &Arc<dyn ToolBackend> {
        &self.backend
    }

    /// Process one raw input line to completion.
    ///
    /// Dropping the returned future at any await point leaves the transcript
    /// consistent: a tool round is only appended once every call in it has
    /// a result.
    pub async fn handle_user_line(&mut self, line: &str) -> Result<TurnOutcome, AgentError> {
        let start = Instant::now();

        // AwaitingUserInput
        let resolved = CommandResolver::new(self.backend.as_ref())
            .resolve(line)
            .await?;
        tracing::info!(kind = ?resolved.kind, turns = resolved.turns.len(), "input resolved");
        self.conversation.append_input(resolved.turns)?;

        let outcome = self.run_loop().await;
        match &outcome {
            Ok(o) => tracing::info!(
                status = ?o.status,
                tool_rounds = o.tool_rounds,
                transcript_len = self.conversation.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "turn complete"
            ),
            Err(e) => tracing::warn!(
                error = %e,
                transcript_len = self.conversation.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "turn failed"
            ),
        }
        outcome
    }

    async fn run_loop(&mut self) -> Result<TurnOutcome, AgentError> {
        let tools = self.backend.list_tools().await?;
        let mut rounds = 0;

        loop {
            // ModelThinking
            tracing::debug!(
                round = rounds,
                turns = self.conversation.len(),
                estimated_tokens = self.conversation.estimated_tokens(),
                "calling model"
            );
            let reply = self
                .gateway
                .send_conversation(self.conversation.turns(), &tools)
                .await?;

            let (calls, text) = match reply {
                ModelReply::FinalAnswer(text) => return Ok(self.finish(text, rounds)),
                ModelReply::ToolRequest { calls, text } if calls.is_empty() => {
                    return Ok(self.finish(text, rounds));
                }
                ModelReply::ToolRequest { calls, text } => (calls, text),
            };

            if rounds >= self.max_tool_rounds {
                let notice = AgentError::LoopLimitExceeded { rounds }.to_string();
                tracing::warn!(
                    rounds,
                    dropped_calls = calls.len(),
                    "tool round ceiling reached"
                );
                self.conversation.append_answer(notice.clone());
                return Ok(TurnOutcome {
                    text: notice,
                    status: TurnStatus::LoopLimitExceeded,
                    tool_rounds: rounds,
                });
            }

            // ExecutingTools
            tracing::info!(
                round = rounds + 1,
                tools = ?calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
                "model requested tools"
            );
            let results = self
                .router
                .dispatch_tool_calls(&calls, self.backend.as_ref())
                .await?;
            let result_turns = results.iter().map(Turn::tool_result).collect();
            self.conversation
                .commit_tool_round(Turn::assistant_with_calls(text, calls), result_turns)?;
            rounds += 1;
        }
    }

    // Done
    fn finish(&mut self, text: String, rounds: usize) -> TurnOutcome {
        self.conversation.append_answer(text.clone());
        TurnOutcome {
            text,
            status: TurnStatus::Answered,
            tool_rounds: rounds,
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_core::types::TurnRole;
    use crate::documents::{DocumentBackend, DocumentStore};
    use crate::inference::errors::InferenceError;
    use crate::inference::types::ToolCall;
    use crate::mcp_client::errors::McpError;
    use crate::mcp_client::types::{McpToolDefinition, PromptDefinition, ToolCallResult};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned replies and records what it was sent.
    struct ScriptedGateway {
        replies: Mutex<VecDeque<Result<ModelReply, InferenceError>>>,
        /// Reply returned once the script runs out.
        repeat: Option<ModelReply>,
        seen: Mutex<Vec<Vec<Turn>>>,
    }

    impl ScriptedGateway {
        fn new(replies: Vec<Result<ModelReply, InferenceError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                repeat: None,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn always(reply: ModelReply) -> Self {
            Self {
                repeat: Some(reply),
                ..Self::new(vec![])
            }
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ModelGateway for ScriptedGateway {
        async fn send_conversation(
            &self,
            turns: &[Turn],
            _tools: &[McpToolDefinition],
        ) -> Result<ModelReply, InferenceError> {
            self.seen.lock().unwrap().push(turns.to_vec());
            match self.replies.lock().unwrap().pop_front() {
                Some(reply) => reply,
                None => self.repeat.clone().ok_or(InferenceError::EmptyResponse),
            }
        }
    }

    fn read_call(id: &str, doc: &str) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: "read_doc_contents".into(),
            arguments: serde_json::json!({ "doc_id": doc }),
        }
    }

    fn setup(gateway: ScriptedGateway) -> (Orchestrator, Arc<ScriptedGateway>, DocumentBackend) {
        let gateway = Arc::new(gateway);
        let backend = DocumentBackend::new(DocumentStore::seeded());
        let orch = Orchestrator::new(gateway.clone(), Arc::new(backend.clone()));
        (orch, gateway, backend)
    }

    #[tokio::test]
    async fn test_single_tool_round_then_answer() {
        let (mut orch, gateway, _) = setup(ScriptedGateway::new(vec![
            Ok(ModelReply::ToolRequest {
                calls: vec![read_call("c1", "spec.txt")],
                text: String::new(),
            }),
            Ok(ModelReply::FinalAnswer("It lists the technical requirements.".into())),
        ]));

        let outcome = orch.handle_user_line("what is in spec.txt?").await.unwrap();
        assert_eq!(outcome.status, TurnStatus::Answered);
        assert_eq!(outcome.tool_rounds, 1);
        assert_eq!(outcome.text, "It lists the technical requirements.");
        assert_eq!(gateway.calls(), 2);

        let turns = orch.conversation().turns();
        let roles: Vec<_> = turns.iter().map(|t| t.role).collect();
        assert_eq!(
            roles,
            [TurnRole::User, TurnRole::Assistant, TurnRole::Tool, TurnRole::Assistant]
        );
        assert!(turns[2].content.contains("technical requirements"));
        assert_eq!(turns[2].tool_call_id.as_deref(), Some("c1"));

        // The second model call saw the tool result.
        assert_eq!(gateway.seen.lock().unwrap()[1].len(), 3);
    }

    #[tokio::test]
    async fn test_batch_results_match_requests_in_order() {
        let calls = vec![
            read_call("a", "plan.md"),
            read_call("b", "missing.md"),
            read_call("c", "outlook.pdf"),
        ];
        let (mut orch, _, _) = setup(ScriptedGateway::new(vec![
            Ok(ModelReply::ToolRequest {
                calls,
                text: "Reading three docs.".into(),
            }),
            Ok(ModelReply::FinalAnswer("done".into())),
        ]));

        orch.handle_user_line("read them").await.unwrap();
        let turns = orch.conversation().turns();
        assert_eq!(turns[1].content, "Reading three docs.");
        let ids: Vec<_> = turns[2..5]
            .iter()
            .map(|t| t.tool_call_id.as_deref().unwrap())
            .collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert!(turns[3].is_error);
        assert!(!orch.conversation().has_pending_tool_calls());
    }

    #[tokio::test]
    async fn test_loop_limit_stops_after_ceiling() {
        let (orch, gateway, _) = setup(ScriptedGateway::always(ModelReply::ToolRequest {
            calls: vec![read_call("c", "plan.md")],
            text: String::new(),
        }));
        let mut orch = orch.with_max_tool_rounds(10);

        let outcome = orch.handle_user_line("loop forever").await.unwrap();
        assert_eq!(outcome.status, TurnStatus::LoopLimitExceeded);
        assert_eq!(outcome.tool_rounds, 10);
        assert_eq!(gateway.calls(), 11);

        let turns = orch.conversation().turns();
        let last = turns.last().unwrap();
        assert_eq!(last.role, TurnRole::Assistant);
        assert!(!last.has_tool_calls());
        assert_eq!(last.content, outcome.text);
        // user + 10 x (assistant + tool) + notice
        assert_eq!(turns.len(), 1 + 20 + 1);
        assert!(!orch.conversation().has_pending_tool_calls());
    }

    #[tokio::test]
    async fn test_gateway_error_ends_turn_and_keeps_user_turn() {
        let (mut orch, _, _) = setup(ScriptedGateway::new(vec![Err(
            InferenceError::ConnectionFailed {
                endpoint: "http://localhost:1234/v1/chat/completions".into(),
                reason: "connection refused".into(),
            },
        )]));

        let err = orch.handle_user_line("hello").await.unwrap_err();
        assert!(matches!(err, AgentError::Gateway(_)));
        assert_eq!(orch.conversation().turns(), &[Turn::user("hello")]);
    }

    #[tokio::test]
    async fn test_edit_tool_is_visible_through_resource() {
        let (mut orch, _, backend) = setup(ScriptedGateway::new(vec![
            Ok(ModelReply::ToolRequest {
                calls: vec![ToolCall {
                    id: "e1".into(),
                    name: "edit_document".into(),
                    arguments: serde_json::json!({
                        "doc_id": "report.pdf", "old_str": "20m", "new_str": "25m"
                    }),
                }],
                text: String::new(),
            }),
            Ok(ModelReply::FinalAnswer("Updated.".into())),
        ]));

        orch.handle_user_line("change 20m to 25m in report.pdf").await.unwrap();
        let content = backend
            .read_resource("docs://documents/report.pdf")
            .await
            .unwrap();
        assert!(content.contains("25m condenser tower"));
    }

    #[tokio::test]
    async fn test_prompt_and_mentions_reach_the_model() {
        let (mut orch, gateway, _) = setup(ScriptedGateway::new(vec![
            Ok(ModelReply::FinalAnswer("formatted".into())),
            Ok(ModelReply::FinalAnswer("compared".into())),
        ]));

        orch.handle_user_line("/format plan.md").await.unwrap();
        orch.handle_user_line("compare @plan.md and @nope.md").await.unwrap();

        let seen = gateway.seen.lock().unwrap();
        assert!(seen[0][0].content.contains("The plan outlines the steps"));
        let mention_turn = &seen[1][2];
        assert_eq!(mention_turn.role, TurnRole::User);
        assert!(mention_turn.content.contains("<document id=\"plan.md\">"));
        assert!(mention_turn.content.contains("'nope.md' was not found"));
    }

    #[tokio::test]
    async fn test_empty_tool_request_is_an_answer() {
        let (mut orch, _, _) = setup(ScriptedGateway::new(vec![Ok(ModelReply::ToolRequest {
            calls: vec![],
            text: "nothing to do".into(),
        })]));
        let outcome = orch.handle_user_line("hi").await.unwrap();
        assert_eq!(outcome.status, TurnStatus::Answered);
        assert_eq!(outcome.text, "nothing to do");
        assert_eq!(outcome.tool_rounds, 0);
    }

    #[tokio::test]
    async fn test_cancelled_turn_leaves_no_pending_calls() {
        // A gateway that never answers the second call.
        struct StallingGateway;

        #[async_trait]
        impl ModelGateway for StallingGateway {
            async fn send_conversation(
                &self,
                turns: &[Turn],
                _tools: &[McpToolDefinition],
            ) -> Result<ModelReply, InferenceError> {
                if turns.len() == 1 {
                    return Ok(ModelReply::ToolRequest {
                        calls: vec![read_call("c1", "plan.md")],
                        text: String::new(),
                    });
                }
                futures::future::pending().await
            }
        }

        let backend = DocumentBackend::new(DocumentStore::seeded());
        let mut orch = Orchestrator::new(Arc::new(StallingGateway), Arc::new(backend));

        let aborted = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            orch.handle_user_line("read plan"),
        )
        .await;
        assert!(aborted.is_err());
        assert!(!orch.conversation().has_pending_tool_calls());
        assert_eq!(orch.conversation().len(), 3);
    }

    /// Document backend whose connection drops after the first tool call.
    struct FlakyBackend {
        inner: DocumentBackend,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl ToolBackend for FlakyBackend {
        async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpError> {
            self.inner.list_tools().await
        }

        async fn call_tool(&self, call: &ToolCall) -> Result<ToolCallResult, McpError> {
            if self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) > 0 {
                return Err(McpError::BackendUnavailable {
                    server: "documents".into(),
                    reason: "pipe closed".into(),
                });
            }
            self.inner.call_tool(call).await
        }

        async fn read_resource(&self, uri: &str) -> Result<String, McpError> {
            self.inner.read_resource(uri).await
        }

        async fn list_prompts(&self) -> Result<Vec<PromptDefinition>, McpError> {
            self.inner.list_prompts().await
        }

        async fn get_prompt(
            &self,
            name: &str,
            arguments: &std::collections::HashMap<String, String>,
        ) -> Result<Vec<Turn>, McpError> {
            self.inner.get_prompt(name, arguments).await
        }
    }

    #[tokio::test]
    async fn test_backend_lost_mid_batch_ends_turn_without_partial_round() {
        let gateway = Arc::new(ScriptedGateway::new(vec![Ok(ModelReply::ToolRequest {
            calls: vec![read_call("a", "plan.md"), read_call("b", "spec.txt")],
            text: String::new(),
        })]));
        let backend = FlakyBackend {
            inner: DocumentBackend::new(DocumentStore::seeded()),
            calls: std::sync::atomic::AtomicUsize::new(0),
        };
        let mut orch = Orchestrator::new(gateway.clone(), Arc::new(backend));

        let err = orch.handle_user_line("read both").await.unwrap_err();
        assert!(err.is_backend_unavailable());
        assert_eq!(gateway.calls(), 1);
        assert!(!orch.conversation().has_pending_tool_calls());
        assert_eq!(orch.conversation().turns(), &[Turn::user("read both")]);
    }
}
