//! CommandResolver: turns one raw input line into the turns to append.
//!
//! - `/name [argument]` runs a prompt if `name` is a known prompt, otherwise
//!   the line is plain text.
//! - `@doc_id` mentions are fetched fresh through the backend and spliced in
//!   front of the user's text. A missing document becomes an inline notice.
//! - Anything else is a single user turn, unchanged.

use std::collections::HashMap;

use regex::Regex;

use crate::mcp_client::backend::{document_uri, ToolBackend};
use crate::mcp_client::errors::McpError;

use super::types::Turn;

// ─── Public Types ───────────────────────────────────────────────────────────

/// What kind of line was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputKind {
    Plain,
    /// Mentions in first-occurrence order, split by whether they resolved.
    Mentions {
        found: Vec<String>,
        missing: Vec<String>,
    },
    Prompt {
        name: String,
    },
}

#[derive(Debug, Clone)]
pub struct ResolvedInput {
    pub kind: InputKind,
    /// Turns to append, in order. Never empty.
    pub turns: Vec<Turn>,
}

// ─── Parsing ────────────────────────────────────────────────────────────────

/// `@doc_id` tokens in order of first occurrence, without duplicates.
///
/// A mention starts the line or follows a character that is neither a word
/// character nor `@`, so `(@plan.md)` and `@a.md,@b.md` count while e-mail
/// addresses do not. A trailing `.` is sentence punctuation, not part of the id.
pub fn find_mentions(text: &str) -> Vec<String> {
    let Ok(re) = Regex::new(r"(?:^|[^\w@])@([\w\-./]+)") else {
        return Vec::new();
    };
    let mut mentions: Vec<String> = Vec::new();
    for cap in re.captures_iter(text) {
        let id = cap[1].trim_end_matches('.');
        if !id.is_empty() && !mentions.iter().any(|m| m == id) {
            mentions.push(id.to_string());
        }
    }
    mentions
}

/// Split `/name rest` into `(name, rest)`. `None` if the line is not a
/// slash command.
pub fn parse_slash_command(line: &str) -> Option<(&str, &str)> {
    let body = line.strip_prefix('/')?;
    let (name, rest) = match body.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (body, ""),
    };
    (!name.is_empty()).then_some((name, rest))
}

// ─── CommandResolver ────────────────────────────────────────────────────────

pub struct CommandResolver<'a> {
    backend: &'a dyn ToolBackend,
}

impl<'a> CommandResolver<'a> {
    pub fn new(backend: &'a dyn ToolBackend) -> Self {
        Self { backend }
    }

    /// Resolve one input line.
    ///
    /// Errors are limited to backend unavailability and prompt expansion
    /// failures; a missing mention is never an error.
    pub async fn resolve(&self, line: &str) -> Result<ResolvedInput, McpError> {
        if let Some((name, argument)) = parse_slash_command(line) {
            if let Some(resolved) = self.resolve_prompt(name, argument).await? {
                return Ok(resolved);
            }
            tracing::debug!(command = name, "unknown slash command; sending as text");
            return Ok(plain(line));
        }

        let mentions = find_mentions(line);
        if mentions.is_empty() {
            return Ok(plain(line));
        }
        self.resolve_mentions(line, mentions).await
    }

    /// `Ok(None)` when `name` is not a known prompt.
    async fn resolve_prompt(
        &self,
        name: &str,
        argument: &str,
    ) -> Result<Option<ResolvedInput>, McpError> {
        let prompts = self.backend.list_prompts().await?;
        let Some(prompt) = prompts.iter().find(|p| p.name == name) else {
            return Ok(None);
        };

        let mut args = HashMap::new();
        if !argument.is_empty() {
            if let Some(first) = prompt.arguments.first() {
                args.insert(first.name.clone(), argument.to_string());
            }
        }

        let turns = self.backend.get_prompt(name, &args).await?;
        if turns.is_empty() {
            return Err(McpError::PromptFailed {
                name: name.to_string(),
                reason: "prompt expanded to no messages".into(),
            });
        }
        tracing::info!(prompt = name, turns = turns.len(), "prompt expanded");

        Ok(Some(ResolvedInput {
            kind: InputKind::Prompt {
                name: name.to_string(),
            },
            turns,
        }))
    }

    async fn resolve_mentions(
        &self,
        line: &str,
        mentions: Vec<String>,
    ) -> Result<ResolvedInput, McpError> {
        let mut context = String::new();
        let mut found = Vec::new();
        let mut missing = Vec::new();

        for doc_id in mentions {
            match self.backend.read_resource(&document_uri(&doc_id)).await {
                Ok(content) => {
                    context.push_str(&format!(
                        "<document id=\"{doc_id}\">\n{content}\n</document>\n"
                    ));
                    found.push(doc_id);
                }
                Err(e) if e.is_unavailable() => return Err(e),
                Err(e) => {
                    tracing::info!(doc_id = %doc_id, error = %e, "mentioned document not found");
                    context.push_str(&format!("[Document '{doc_id}' was not found.]\n"));
                    missing.push(doc_id);
                }
            }
        }

        let content = format!("The user referenced these documents:\n{context}\n{line}");
        Ok(ResolvedInput {
            kind: InputKind::Mentions { found, missing },
            turns: vec![Turn::user(content)],
        })
    }
}

fn plain(line: &str) -> ResolvedInput {
    ResolvedInput {
        kind: InputKind::Plain,
        turns: vec![Turn::user(line)],
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
