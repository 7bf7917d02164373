//! Backend reader task.
//!
//! Reads newline-delimited JSON from the backend's stdout, translates each
//! line with [`parse_line`], and forwards the results as [`BackendItem`]s.
//! Parsing failures are forwarded rather than dropped: whether they are
//! fatal is the turn engine's decision (strict mode).

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::codec::BackendCodec;
use super::link::BackendItem;
use crate::protocol::{parse_line, MalformedEvent};
use crate::{AppError, Result};

/// Reader task: decode `stdout` and deliver items through `event_tx`.
///
/// On EOF or an unrecoverable I/O error, sends [`BackendItem::Closed`] and
/// returns. Over-long lines are reported as [`BackendItem::Malformed`] and
/// reading continues.
///
/// # Cancellation
///
/// When `cancel` fires the task exits without sending `Closed`.
///
/// # Errors
///
/// Always returns `Ok(())`; failures are reported through the channel.
pub async fn run_reader<R>(
    session_id: String,
    stdout: R,
    event_tx: mpsc::Sender<BackendItem>,
    cancel: CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stdout, BackendCodec::new());
    // FramedRead yields a single `None` after a decoder error; that one is
    // not EOF.
    let mut after_framing_error = false;

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(session_id, "backend reader: cancellation received, stopping");
                break;
            }

            item = framed.next() => {
                match item {
                    None if after_framing_error => {
                        after_framing_error = false;
                    }

                    None => {
                        debug!(session_id, "backend reader: EOF detected");
                        send_closed(&event_tx, &session_id, "stream closed".to_owned()).await;
                        break;
                    }

                    Some(Err(AppError::Protocol(msg))) => {
                        warn!(session_id, error = msg.as_str(), "backend reader: framing error");
                        after_framing_error = true;
                        let item = BackendItem::Malformed(MalformedEvent::new("", msg));
                        if event_tx.send(item).await.is_err() {
                            break;
                        }
                    }

                    Some(Err(e)) => {
                        warn!(session_id, error = %e, "backend reader: IO error, stopping");
                        send_closed(&event_tx, &session_id, format!("stream error: {e}")).await;
                        break;
                    }

                    Some(Ok(line)) => {
                        after_framing_error = false;
                        if !forward_line(&session_id, &line, &event_tx).await {
                            debug!(session_id, "backend reader: event_tx closed, stopping");
                            break;
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

/// Translate one line and send its items. Returns `false` once the
/// receiving side is gone.
async fn forward_line(session_id: &str, line: &str, event_tx: &mpsc::Sender<BackendItem>) -> bool {
    match parse_line(line) {
        Ok(events) => {
            for event in events {
                if event_tx.send(BackendItem::Event(event)).await.is_err() {
                    return false;
                }
            }
            true
        }
        Err(malformed) => {
            debug!(
                session_id,
                reason = malformed.reason.as_str(),
                "backend reader: malformed line"
            );
            event_tx.send(BackendItem::Malformed(malformed)).await.is_ok()
        }
    }
}

async fn send_closed(event_tx: &mpsc::Sender<BackendItem>, session_id: &str, reason: String) {
    if event_tx.send(BackendItem::Closed { reason }).await.is_err() {
        debug!(
            session_id,
            "backend reader: event_tx closed before Closed could be delivered"
        );
    }
}
