//! Backend process spawner.
//!
//! Spawns the model backend with:
//! - `kill_on_drop(true)` so the process never outlives its handle.
//! - `env_clear()` plus an allowlist, so unrelated secrets in the agent's
//!   environment never reach the backend.
//! - piped stdin/stdout/stderr.
//!
//! Stream-json backends stay silent until they receive their first user
//! message, so there is no ready-signal handshake.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::BackendConfig;
use crate::{AppError, Result};

/// Environment variables inherited by the backend process.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "RUST_LOG",
    "ANTHROPIC_API_KEY",
    "ANTHROPIC_BASE_URL",
    // Windows-specific variables.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
    "USERNAME",
    "APPDATA",
    "LOCALAPPDATA",
    "COMSPEC",
];

/// Environment variable carrying the agent session id into the backend.
pub const SESSION_ENV_VAR: &str = "ACP_TURN_AGENT_SESSION_ID";

/// A running backend and its captured stdio.
#[derive(Debug)]
pub struct BackendProcess {
    /// Session the process was launched for.
    pub session_id: String,
    /// Child handle; dropping it kills the process.
    pub child: Child,
    /// Backend stdin.
    pub stdin: ChildStdin,
    /// Backend stdout.
    pub stdout: ChildStdout,
    /// Backend stderr.
    pub stderr: ChildStderr,
}

/// Spawn the backend described by `config`.
///
/// # Errors
///
/// - `AppError::Config("session_id must not be empty")`.
/// - `AppError::Backend("failed to spawn backend: …")` on OS spawn failure.
/// - `AppError::Backend("failed to capture …")` if a pipe is missing.
pub fn spawn_backend(config: &BackendConfig, session_id: &str) -> Result<BackendProcess> {
    if session_id.trim().is_empty() {
        return Err(AppError::Config("session_id must not be empty".into()));
    }

    let mut cmd = Command::new(&config.host_cli);
    cmd.args(&config.host_cli_args);

    cmd.env_clear();
    for &key in ALLOWED_ENV_VARS {
        if let Ok(val) = std::env::var(key) {
            cmd.env(key, val);
        }
    }
    cmd.env(SESSION_ENV_VAR, session_id);

    cmd.current_dir(&config.workspace_root)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|err| AppError::Backend(format!("failed to spawn backend: {err}")))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Backend("failed to capture backend stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Backend("failed to capture backend stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Backend("failed to capture backend stderr".into()))?;

    info!(
        session_id,
        host_cli = config.host_cli.as_str(),
        pid = child.id(),
        "backend spawned"
    );

    Ok(BackendProcess {
        session_id: session_id.to_owned(),
        child,
        stdin,
        stdout,
        stderr,
    })
}

/// Drain backend stderr so the child never blocks on a full pipe.
///
/// Lines are logged at `DEBUG` when `log_lines` is set and discarded
/// otherwise.
#[must_use]
pub fn forward_stderr(
    session_id: String,
    stderr: ChildStderr,
    log_lines: bool,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if log_lines {
                            debug!(session_id, line = line.as_str(), "backend stderr");
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        warn!(session_id, %err, "backend stderr read failed");
                        break;
                    }
                },
            }
        }
    })
}

/// Await backend exit and log it.
///
/// Resolves to the exit code (`None` when killed by a signal, on a wait
/// error, or when `cancel` fires first, in which case the child is killed).
#[must_use]
pub fn monitor_exit(
    session_id: String,
    mut child: Child,
    cancel: CancellationToken,
) -> JoinHandle<Option<i32>> {
    tokio::spawn(async move {
        tokio::select! {
            result = child.wait() => match result {
                Ok(status) => {
                    let code = status.code();
                    info!(session_id, exit_code = code, "backend exited");
                    code
                }
                Err(err) => {
                    warn!(session_id, %err, "error waiting for backend process");
                    None
                }
            },
            () = cancel.cancelled() => {
                info!(session_id, "monitor_exit: cancellation received, killing backend");
                if let Err(err) = child.kill().await {
                    debug!(session_id, %err, "backend kill failed");
                }
                None
            }
        }
    })
}
