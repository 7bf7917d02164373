#![forbid(unsafe_code)]

//! `acp-turn-agent`: runs one prompt turn against the configured backend
//! and writes client updates to stdout as newline-delimited JSON-RPC.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use acp_turn_agent::backend;
use acp_turn_agent::client::{prompt_to_user_content, NdjsonEmitter, PromptBlock};
use acp_turn_agent::config::GlobalConfig;
use acp_turn_agent::tools::{ToolCoordinator, ToolRegistry};
use acp_turn_agent::turn::TurnEngine;
use acp_turn_agent::{AppError, Result};

/// JSON-RPC id the final stop reason is reported under.
const PROMPT_REQUEST_ID: u64 = 1;

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "acp-turn-agent", about = "Run one ACP prompt turn", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Session identifier; a random one is generated when omitted.
    #[arg(long)]
    session_id: Option<String>,

    /// Prompt text.
    #[arg(required = true, num_args = 1..)]
    prompt: Vec<String>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let config = GlobalConfig::load_from_path(&args.config)?;
    let session_id = args
        .session_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    info!(
        session_id = session_id.as_str(),
        workspace_root = %config.workspace_root().display(),
        "configuration loaded"
    );

    // ── Tools and engine ────────────────────────────────
    let registry = Arc::new(ToolRegistry::with_builtin_tools(config.workspace_root())?);
    let coordinator = ToolCoordinator::new(registry);
    let emitter = NdjsonEmitter::new(tokio::io::stdout(), json!(PROMPT_REQUEST_ID));
    let engine = TurnEngine::new(config.turn.clone(), coordinator, emitter)?;

    // ── Start backend ───────────────────────────────────
    let transport_ct = CancellationToken::new();
    let (mut link, tasks) = backend::launch(&config.backend, &session_id, &transport_ct)?;

    let turn_ct = CancellationToken::new();
    let signal_ct = turn_ct.clone();
    let signal_handle = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received; cancelling turn");
                signal_ct.cancel();
            }
            Err(err) => warn!(%err, "ctrl-c handler unavailable"),
        }
    });

    // ── Run the turn ────────────────────────────────────
    let prompt = prompt_to_user_content(&[PromptBlock::Text {
        text: args.prompt.join(" "),
    }]);
    let mut turn = engine.new_turn(&session_id);
    let outcome = engine.run_turn(&mut turn, &mut link, prompt, &turn_ct).await;

    // ── Shutdown ────────────────────────────────────────
    signal_handle.abort();
    drop(link);
    let exit_code = tasks.shutdown().await;
    info!(exit_code, "backend shut down");

    match outcome {
        Ok(stop_reason) => {
            info!(?stop_reason, "acp-turn-agent finished");
            Ok(())
        }
        Err(err) => {
            error!(%err, "turn failed");
            Err(err)
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
