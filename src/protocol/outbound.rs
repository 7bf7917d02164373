//! Outbound backend message serialisation.
//!
//! Every message is a single JSON object written as one line to the
//! backend's stdin; framing (the trailing `\n`) is added by the writer task.

use serde_json::{json, Value};

use super::events::ToolRequest;
use crate::{AppError, Result};

/// Content of a user message: a plain string or a list of content blocks.
#[derive(Debug, Clone, PartialEq)]
pub enum UserContent {
    /// Plain text.
    Text(String),
    /// Pre-built backend content blocks (`{"type":"text",...}`, …).
    Blocks(Vec<Value>),
}

impl UserContent {
    fn to_value(&self) -> Value {
        match self {
            Self::Text(text) => Value::String(text.clone()),
            Self::Blocks(blocks) => Value::Array(blocks.clone()),
        }
    }

    /// Whether there is nothing to send.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::Blocks(blocks) => blocks.is_empty(),
        }
    }
}

/// Result of one tool invocation, keyed by the originating tool-use id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResultMessage {
    tool_use_id: String,
    text: String,
    is_error: bool,
}

impl ToolResultMessage {
    /// Build a result that answers `request`.
    #[must_use]
    pub fn for_request(request: &ToolRequest, text: impl Into<String>, is_error: bool) -> Self {
        Self {
            tool_use_id: request.id.clone(),
            text: text.into(),
            is_error,
        }
    }

    /// Build a result for a tool-call id reported by the caller, checking it
    /// against the originating request.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ToolCallMismatch`] when `tool_call_id` is not
    /// byte-for-byte identical to `request.id`.
    pub fn checked(
        request: &ToolRequest,
        tool_call_id: &str,
        text: impl Into<String>,
        is_error: bool,
    ) -> Result<Self> {
        if tool_call_id != request.id {
            return Err(AppError::ToolCallMismatch {
                expected: request.id.clone(),
                actual: tool_call_id.to_owned(),
            });
        }
        Ok(Self::for_request(request, text, is_error))
    }

    /// The tool-use id this result answers.
    #[must_use]
    pub fn tool_use_id(&self) -> &str {
        &self.tool_use_id
    }

    /// Payload text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether the payload describes a failure.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.is_error
    }
}

/// A message destined for the backend's stdin.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// A user turn.
    User(UserContent),
    /// A tool result fed back into the conversation.
    ToolResult(ToolResultMessage),
    /// Ask the backend to stop the in-flight round-trip.
    Interrupt {
        /// Correlation id for the control request.
        request_id: String,
    },
}

impl OutboundMessage {
    /// The JSON value written for this message.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::User(content) => json!({
                "type": "user",
                "message": { "role": "user", "content": content.to_value() }
            }),
            Self::ToolResult(result) => {
                let mut block = json!({
                    "tool_use_id": result.tool_use_id,
                    "type": "tool_result",
                    "content": [{ "type": "text", "text": result.text }]
                });
                if result.is_error {
                    block["is_error"] = Value::Bool(true);
                }
                json!({
                    "type": "user",
                    "message": { "role": "user", "content": [block] }
                })
            }
            Self::Interrupt { request_id } => json!({
                "type": "control_request",
                "request_id": request_id,
                "request": { "subtype": "interrupt" }
            }),
        }
    }

    /// Compact single-line JSON, without the trailing newline.
    #[must_use]
    pub fn to_line(&self) -> String {
        self.to_value().to_string()
    }

    /// Short label for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::ToolResult(_) => "tool_result",
            Self::Interrupt { .. } => "interrupt",
        }
    }
}
