//! Backend transport.
//!
//! Owns the model backend subprocess and its standard streams:
//!
//! - [`codec`]: NDJSON line framing.
//! - [`spawner`]: process launch, stderr draining, exit monitoring.
//! - [`reader`]: stdout → [`BackendItem`] channel.
//! - [`writer`]: [`OutboundMessage`](crate::protocol::OutboundMessage) channel → stdin.
//! - [`link`]: the channel pair a turn holds.

pub mod codec;
pub mod link;
pub mod reader;
pub mod spawner;
pub mod writer;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::BackendConfig;
use crate::Result;

pub use link::{BackendEnds, BackendItem, BackendLink, DEFAULT_LINK_CAPACITY};

/// Background tasks serving one backend process.
#[derive(Debug)]
pub struct BackendTasks {
    /// Stdout reader.
    pub reader: JoinHandle<Result<()>>,
    /// Stdin writer.
    pub writer: JoinHandle<Result<()>>,
    /// Stderr drain.
    pub stderr: JoinHandle<()>,
    /// Exit monitor; resolves to the exit code.
    pub exit: JoinHandle<Option<i32>>,
    cancel: CancellationToken,
}

impl BackendTasks {
    /// Stop every task and kill the backend if it is still running.
    pub async fn shutdown(self) -> Option<i32> {
        self.cancel.cancel();
        for (name, handle) in [("reader", self.reader), ("writer", self.writer)] {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(task = name, error = %err, "backend task failed"),
                Err(err) => warn!(task = name, error = %err, "backend task panicked"),
            }
        }
        if let Err(err) = self.stderr.await {
            warn!(error = %err, "backend stderr task panicked");
        }
        self.exit.await.ok().flatten()
    }
}

/// Spawn the backend and wire its reader, writer, stderr, and exit tasks.
///
/// `cancel` tears the whole transport down; it is separate from any
/// per-turn cancellation.
///
/// # Errors
///
/// Propagates [`spawner::spawn_backend`] failures.
pub fn launch(
    config: &BackendConfig,
    session_id: &str,
    cancel: &CancellationToken,
) -> Result<(BackendLink, BackendTasks)> {
    let process = spawner::spawn_backend(config, session_id)?;
    let pid = process.child.id();
    let (link, ends) = BackendLink::channel(DEFAULT_LINK_CAPACITY);

    let reader = tokio::spawn(reader::run_reader(
        session_id.to_owned(),
        process.stdout,
        ends.events_tx,
        cancel.clone(),
    ));
    let writer = tokio::spawn(writer::run_writer(
        session_id.to_owned(),
        process.stdin,
        ends.outbound_rx,
        cancel.clone(),
    ));
    let stderr = spawner::forward_stderr(
        session_id.to_owned(),
        process.stderr,
        config.stderr_log,
        cancel.clone(),
    );
    let exit = spawner::monitor_exit(session_id.to_owned(), process.child, cancel.clone());

    Ok((
        link.with_pid(pid),
        BackendTasks {
            reader,
            writer,
            stderr,
            exit,
            cancel: cancel.clone(),
        },
    ))
}
