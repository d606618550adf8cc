//! docchat: chat with a local LLM about a set of documents.
//!
//!   docchat                         # chat, config from docchat.yaml / env
//!   docchat chat --model qwen3-8b   # override the model
//!   docchat chat --server "uv run search_server.py"   # add an MCP server
//!   docchat serve                   # document backend as an MCP server on stdio

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use docchat::config::{self, CliOverrides};

#[derive(Parser)]
#[command(name = "docchat", version)]
#[command(about = "Terminal document assistant driving a local LLM through MCP tools")]
struct Cli {
    /// Config file (default: $DOCCHAT_CONFIG or the nearest docchat.yaml)
    #[arg(long, short, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Write logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive chat (default)
    Chat {
        /// Model identifier sent to the endpoint
        #[arg(long)]
        model: Option<String>,

        /// OpenAI-compatible base URL, e.g. http://localhost:1234/v1
        #[arg(long)]
        base_url: Option<String>,

        /// Extra MCP server to connect, as a command line (repeatable),
        /// e.g. --server "uv run search_server.py"
        #[arg(long = "server", value_name = "COMMAND")]
        servers: Vec<String>,
    },
    /// Serve the document backend over stdio JSON-RPC
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // Logging failure is not fatal; the chat still works without a log file.
    if let Err(e) = docchat::init_tracing(cli.log_json) {
        eprintln!("warning: logging disabled: {e}");
    }

    let cwd = std::env::current_dir().context("failed to read working directory")?;
    let (mut app_config, path) = config::load_config(cli.config.as_deref(), &cwd)?;
    let source = path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults".into());
    tracing::info!(config = %source, "configuration loaded");

    match cli.command.unwrap_or(Command::Chat {
        model: None,
        base_url: None,
        servers: Vec::new(),
    }) {
        Command::Chat {
            model,
            base_url,
            servers,
        } => {
            app_config.apply_env_overrides();
            app_config.apply_cli_overrides(&CliOverrides {
                model,
                base_url,
                servers,
            });
            if let Err(e) = docchat::cli::run_chat(app_config).await {
                tracing::error!(error = %format!("{e:#}"), "chat failed");
                eprintln!("error: {e:#}");
                std::process::exit(1);
            }
        }
        Command::Serve => docchat::cli::run_serve().await?,
    }

    Ok(())
}
