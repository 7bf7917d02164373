//! Delivery of [`ClientUpdate`]s to the client transport.
//!
//! The turn engine hands every update to an [`UpdateEmitter`] in the order
//! it was decided; emitters must not reorder or batch.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};

use crate::tools::{ToolCallContent, ToolCallStatus, ToolCallUpdate};
use crate::turn::ClientUpdate;
use crate::{AppError, Result};

/// Accepts the engine's ordered updates.
pub trait UpdateEmitter: Send + Sync {
    /// Deliver `update` for `session_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the client transport is gone. The engine logs
    /// it and keeps driving the turn.
    fn emit(
        &self,
        session_id: &str,
        update: ClientUpdate,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Forwards updates into an in-process channel.
#[derive(Debug, Clone)]
pub struct ChannelEmitter {
    tx: mpsc::Sender<ClientUpdate>,
}

impl ChannelEmitter {
    /// Emitter and the receiver its updates arrive on.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ClientUpdate>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl UpdateEmitter for ChannelEmitter {
    fn emit(
        &self,
        _session_id: &str,
        update: ClientUpdate,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.tx
                .send(update)
                .await
                .map_err(|_| AppError::Io("client update channel closed".into()))
        })
    }
}

/// Writes updates as newline-delimited JSON-RPC messages.
///
/// Content and tool updates become `session/update` notifications; the
/// stop reason becomes the response to the originating prompt request.
pub struct NdjsonEmitter<W> {
    out: Arc<Mutex<W>>,
    prompt_request_id: Value,
}

impl<W> NdjsonEmitter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Emitter writing to `out`, answering the prompt request `prompt_request_id`.
    #[must_use]
    pub fn new(out: W, prompt_request_id: Value) -> Self {
        Self {
            out: Arc::new(Mutex::new(out)),
            prompt_request_id,
        }
    }
}

impl<W> UpdateEmitter for NdjsonEmitter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn emit(
        &self,
        session_id: &str,
        update: ClientUpdate,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let message = to_json_rpc(session_id, &update, &self.prompt_request_id);
        Box::pin(async move {
            let mut bytes = message.to_string().into_bytes();
            bytes.push(b'\n');
            let mut out = self.out.lock().await;
            out.write_all(&bytes).await?;
            out.flush().await?;
            Ok(())
        })
    }
}

/// The JSON-RPC message for `update`.
#[must_use]
pub fn to_json_rpc(session_id: &str, update: &ClientUpdate, prompt_request_id: &Value) -> Value {
    match update {
        ClientUpdate::ContentChunk { text } => session_update(
            session_id,
            json!({
                "sessionUpdate": "agent_message_chunk",
                "content": { "type": "text", "text": text }
            }),
        ),
        ClientUpdate::ToolCallStatus(tool) => session_update(session_id, tool_call_json(tool)),
        ClientUpdate::StopReasonReached { stop_reason } => json!({
            "jsonrpc": "2.0",
            "id": prompt_request_id,
            "result": { "stopReason": stop_reason }
        }),
    }
}

fn session_update(session_id: &str, update: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": "session/update",
        "params": { "sessionId": session_id, "update": update }
    })
}

fn tool_call_json(tool: &ToolCallUpdate) -> Value {
    if tool.status == ToolCallStatus::Pending {
        return json!({
            "sessionUpdate": "tool_call",
            "toolCallId": tool.tool_call_id,
            "title": tool.tool_name,
            "status": tool.status,
            "rawInput": tool.raw_input,
        });
    }

    let mut update = json!({
        "sessionUpdate": "tool_call_update",
        "toolCallId": tool.tool_call_id,
        "status": tool.status,
    });
    if let Some(content) = &tool.content {
        let text = match content {
            ToolCallContent::Text { text } => text.clone(),
            ToolCallContent::Error { error } => error.to_string(),
        };
        update["content"] = json!([{ "type": "content", "content": { "type": "text", "text": text } }]);
    }
    update
}
