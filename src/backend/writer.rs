//! Backend writer task.
//!
//! Drains [`OutboundMessage`]s from a channel and writes each as one
//! `\n`-terminated JSON line to the backend's stdin, flushing after every
//! message so the backend sees it immediately.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::protocol::OutboundMessage;
use crate::{AppError, Result};

/// Writer task: serialise messages from `msg_rx` onto `stdin`.
///
/// Exits cleanly when `cancel` fires or every sender is dropped.
///
/// # Errors
///
/// Returns [`AppError::Backend`]`("write failed: …")` if writing to stdin
/// fails (typically because the backend exited). Dropping `msg_rx` on the
/// way out makes later sends fail on the turn side.
pub async fn run_writer<W>(
    session_id: String,
    stdin: W,
    mut msg_rx: mpsc::Receiver<OutboundMessage>,
    cancel: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut stdin = stdin;

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(session_id, "backend writer: cancellation received, stopping");
                break;
            }

            msg = msg_rx.recv() => {
                let Some(message) = msg else {
                    debug!(session_id, "backend writer: message channel closed, stopping");
                    break;
                };

                let mut bytes = message.to_line().into_bytes();
                bytes.push(b'\n');
                trace!(session_id, kind = message.kind(), "backend writer: sending line");

                let written = async {
                    stdin.write_all(&bytes).await?;
                    stdin.flush().await
                }
                .await;

                if let Err(e) = written {
                    warn!(session_id, error = %e, "backend writer: write to stdin failed");
                    return Err(AppError::Backend(format!("write failed: {e}")));
                }
            }
        }
    }

    Ok(())
}
