//! Application configuration (`docchat.yaml`).
//!
//! Resolution order, later wins:
//! 1. Built-in defaults
//! 2. The YAML file (`--config`, `$DOCCHAT_CONFIG`, or the nearest
//!    `docchat.yaml` above the working directory), with `${VAR}` and
//!    `${VAR:-default}` interpolated before parsing
//! 3. `LOCAL_LLM_MODEL`, `LOCAL_LLM_BASE_URL`, `LOCAL_LLM_API_KEY`
//! 4. CLI flags
//!
//! Example:
//!
//! ```yaml
//! model:
//!   base_url: ${LOCAL_LLM_BASE_URL:-http://localhost:1234/v1}
//!   model_name: mistral-small-3.1
//!   tool_call_format: json_prompt
//! agent:
//!   max_tool_rounds: 10
//! backend:
//!   kind: stdio
//!   command: docchat
//!   args: [serve]
//!   extra_servers:
//!     - name: search
//!       command: uv
//!       args: [run, search_server.py]
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::agent_core::orchestrator::DEFAULT_MAX_TOOL_ROUNDS;
use crate::agent_core::tool_router::DEFAULT_MAX_TOOL_RESULT_CHARS;
use crate::inference::config::ModelConfig;
use crate::mcp_client::client::DEFAULT_CALL_TIMEOUT_MS;
use crate::mcp_client::types::ServerConfig;

// ─── Constants ──────────────────────────────────────────────────────────────

pub const CONFIG_FILE_NAME: &str = "docchat.yaml";

/// Points at a config file, overriding the upward search.
pub const CONFIG_ENV_VAR: &str = "DOCCHAT_CONFIG";

const ENV_MODEL: &str = "LOCAL_LLM_MODEL";
const ENV_BASE_URL: &str = "LOCAL_LLM_BASE_URL";
const ENV_API_KEY: &str = "LOCAL_LLM_API_KEY";

// ─── Errors ─────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("invalid configuration: {reason}")]
    Invalid { reason: String },
}

// ─── Types ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub agent: AgentConfig,
    pub backend: BackendConfig,
}

/// The `agent` section: orchestration limits.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Tool rounds allowed per user turn. Must be at least 1.
    pub max_tool_rounds: usize,
    /// Run the calls of one batch concurrently.
    pub parallel_tool_calls: bool,
    pub max_tool_result_chars: usize,
    /// Extra instructions for the system message.
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            parallel_tool_calls: false,
            max_tool_result_chars: DEFAULT_MAX_TOOL_RESULT_CHARS,
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// The document backend, in process.
    #[default]
    Local,
    /// An MCP server spawned as a child process.
    Stdio,
}

/// The `backend` section: where tools come from.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub cwd: Option<String>,
    pub call_timeout_ms: u64,
    /// Further MCP servers whose tools and prompts join the main backend's.
    pub extra_servers: Vec<ExtraServer>,
}

/// One entry of `backend.extra_servers`, or one `--server` flag.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExtraServer {
    /// Log and routing name. Empty means `server_<index>`.
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub cwd: Option<String>,
}

impl ExtraServer {
    /// Parse a `--server` value: the command followed by its arguments,
    /// split on whitespace.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace().map(str::to_string);
        let command = words.next()?;
        Some(Self {
            command,
            args: words.collect(),
            ..Self::default()
        })
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            command: self.command.clone(),
            args: self.args.clone(),
            env: self.env.clone(),
            cwd: self.cwd.clone(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            command: String::new(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
            extra_servers: Vec::new(),
        }
    }
}

impl BackendConfig {
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            command: self.command.clone(),
            args: self.args.clone(),
            env: self.env.clone(),
            cwd: self.cwd.clone(),
        }
    }

    /// Give every unnamed extra server the name `server_<index>`.
    pub fn name_extra_servers(&mut self) {
        for (i, server) in self.extra_servers.iter_mut().enumerate() {
            if server.name.trim().is_empty() {
                server.name = format!("server_{i}");
            }
        }
    }
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// `--server` values, each a command line.
    pub servers: Vec<String>,
}

// ─── Loading ────────────────────────────────────────────────────────────────

/// Locate the config file: `$DOCCHAT_CONFIG` first, then `docchat.yaml` in
/// `start` or any ancestor.
pub fn find_config_path(start: &Path) -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        let candidate = PathBuf::from(expand_tilde(&path));
        if candidate.exists() {
            return Some(candidate);
        }
        tracing::warn!(path = %candidate.display(), "{CONFIG_ENV_VAR} points at a missing file");
    }

    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Load the file layer. An explicit path must exist; without one, a missing
/// file means built-in defaults.
pub fn load_config(
    explicit: Option<&Path>,
    start: &Path,
) -> Result<(AppConfig, Option<PathBuf>), ConfigError> {
    let path = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => find_config_path(start),
    };

    let Some(path) = path else {
        return Ok((AppConfig::default(), None));
    };

    let raw = std::fs::read_to_string(&path).map_err(|e| ConfigError::Read {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    let config = parse_config(&raw).map_err(|reason| ConfigError::Parse {
        path: path.clone(),
        reason,
    })?;
    Ok((config, Some(path)))
}

/// Interpolate and parse YAML text. An empty document is all defaults.
pub fn parse_config(raw: &str) -> Result<AppConfig, String> {
    let interpolated = interpolate_env_vars(raw);
    if interpolated.trim().is_empty() {
        return Ok(AppConfig::default());
    }
    let mut config: AppConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| e.to_string())?;
    config.backend.name_extra_servers();
    Ok(config)
}

impl AppConfig {
    /// Apply `LOCAL_LLM_*` from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply `LOCAL_LLM_*` from an arbitrary lookup. Empty values are ignored.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key| lookup(key).filter(|v: &String| !v.trim().is_empty());
        if let Some(model) = get(ENV_MODEL) {
            self.model.model_name = model;
        }
        if let Some(url) = get(ENV_BASE_URL) {
            self.model.base_url = url;
        }
        if let Some(key) = get(ENV_API_KEY) {
            self.model.api_key = key;
        }
    }

    pub fn apply_cli_overrides(&mut self, cli: &CliOverrides) {
        if let Some(model) = &cli.model {
            self.model.model_name = model.clone();
        }
        if let Some(url) = &cli.base_url {
            self.model.base_url = url.clone();
        }
        self.backend.extra_servers.extend(
            cli.servers
                .iter()
                .filter_map(|line| ExtraServer::from_command_line(line)),
        );
        self.backend.name_extra_servers();
    }

    /// Validate everything the chat command needs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.model.validate().map_err(|e| ConfigError::Invalid {
            reason: e.to_string(),
        })?;
        self.validate_backend()?;
        if self.agent.max_tool_rounds == 0 {
            return Err(ConfigError::Invalid {
                reason: "agent.max_tool_rounds must be at least 1".into(),
            });
        }
        if self.agent.max_tool_result_chars == 0 {
            return Err(ConfigError::Invalid {
                reason: "agent.max_tool_result_chars must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// Check the `backend` section alone.
    pub fn validate_backend(&self) -> Result<(), ConfigError> {
        if self.backend.kind == BackendKind::Stdio && self.backend.command.trim().is_empty() {
            return Err(ConfigError::Invalid {
                reason: "backend.command is required when backend.kind is stdio".into(),
            });
        }
        if self.backend.call_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: "backend.call_timeout_ms must be greater than zero".into(),
            });
        }
        if let Some(i) = self
            .backend
            .extra_servers
            .iter()
            .position(|s| s.command.trim().is_empty())
        {
            return Err(ConfigError::Invalid {
                reason: format!("backend.extra_servers[{i}] has no command"),
            });
        }
        Ok(())
    }
}

// ─── Env-var interpolation ──────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve `VAR` or `VAR:-default`. Unset or empty variables take the
/// default.
fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((name, default)) => std::env::var(name)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| expand_tilde(default)),
        None => std::env::var(expr).unwrap_or_default(),
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::config::{ToolCallFormat, DEFAULT_BASE_URL};

    #[test]
    fn test_interpolate_env_vars() {
        std::env::remove_var("__DOCCHAT_TEST_UNSET__");
        std::env::set_var("__DOCCHAT_TEST_SET__", "qwen");
        assert_eq!(
            interpolate_env_vars("a: ${__DOCCHAT_TEST_UNSET__:-fallback}"),
            "a: fallback"
        );
        assert_eq!(interpolate_env_vars("m: ${__DOCCHAT_TEST_SET__}"), "m: qwen");
        assert_eq!(interpolate_env_vars("m: ${__DOCCHAT_TEST_UNSET__}"), "m: ");
        assert_eq!(interpolate_env_vars("cost: $5"), "cost: $5");
        std::env::remove_var("__DOCCHAT_TEST_SET__");
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
model:
  model_name: mistral-small
  tool_call_format: json_prompt
agent:
  max_tool_rounds: 4
  parallel_tool_calls: true
backend:
  kind: stdio
  command: docchat
  args: [serve]
"#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.model.model_name, "mistral-small");
        assert_eq!(config.model.tool_call_format, ToolCallFormat::JsonPrompt);
        assert_eq!(config.agent.max_tool_rounds, 4);
        assert!(config.agent.parallel_tool_calls);
        assert_eq!(config.agent.max_tool_result_chars, DEFAULT_MAX_TOOL_RESULT_CHARS);
        assert_eq!(config.backend.kind, BackendKind::Stdio);
        assert_eq!(config.backend.server_config().args, vec!["serve"]);
        assert_eq!(config.backend.call_timeout_ms, DEFAULT_CALL_TIMEOUT_MS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_file_is_defaults() {
        let config = parse_config("  \n").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.model.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.agent.max_tool_rounds, 10);
    }

    #[test]
    fn test_unknown_enum_value_is_parse_error() {
        assert!(parse_config("backend:\n  kind: carrier_pigeon\n").is_err());
    }

    #[test]
    fn test_override_precedence() {
        let mut config = parse_config("model:\n  model_name: from-file\n").unwrap();
        config.apply_overrides_from(|key| match key {
            "LOCAL_LLM_MODEL" => Some("from-env".into()),
            "LOCAL_LLM_API_KEY" => Some("  ".into()),
            _ => None,
        });
        assert_eq!(config.model.model_name, "from-env");
        assert_eq!(config.model.api_key, "not-needed");

        config.apply_cli_overrides(&CliOverrides {
            model: Some("from-cli".into()),
            base_url: Some("http://127.0.0.1:8080/v1".into()),
            servers: Vec::new(),
        });
        assert_eq!(config.model.model_name, "from-cli");
        assert_eq!(config.model.base_url, "http://127.0.0.1:8080/v1");
    }

    #[test]
    fn test_extra_servers_from_file_and_flags() {
        let yaml = r#"
backend:
  extra_servers:
    - name: search
      command: uv
      args: [run, search.py]
    - command: node
"#;
        let mut config = parse_config(yaml).unwrap();
        config.apply_cli_overrides(&CliOverrides {
            servers: vec!["uv run weather.py".into(), "   ".into()],
            ..CliOverrides::default()
        });

        let extras = &config.backend.extra_servers;
        let names: Vec<_> = extras.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["search", "server_1", "server_2"]);
        assert_eq!(extras[2].command, "uv");
        assert_eq!(extras[2].server_config().args, vec!["run", "weather.py"]);
    }

    #[test]
    fn test_extra_server_needs_command() {
        let mut config = parse_config("model:\n  model_name: m\n").unwrap();
        config.backend.extra_servers.push(ExtraServer::default());
        assert!(matches!(config.validate_backend(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_validation_failures() {
        let config = AppConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));

        let mut config = parse_config("model:\n  model_name: m\n").unwrap();
        config.agent.max_tool_rounds = 0;
        assert!(config.validate().is_err());

        let mut config = parse_config("model:\n  model_name: m\n").unwrap();
        config.backend.kind = BackendKind::Stdio;
        assert!(config.validate().is_err());
        assert!(config.validate_backend().is_err());
    }

    #[test]
    fn test_load_config_walks_upward() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(
            root.path().join(CONFIG_FILE_NAME),
            "model:\n  model_name: found\n",
        )
        .unwrap();
        let nested = root.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        let (config, path) = load_config(None, &nested).unwrap();
        assert_eq!(config.model.model_name, "found");
        assert_eq!(path.unwrap(), root.path().join(CONFIG_FILE_NAME));
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.yaml");
        let err = load_config(Some(&missing), dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
