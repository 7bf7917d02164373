//! Parsed backend event types.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One parsed unit from the backend's output stream.
///
/// Produced by [`parse_line`](super::parse_line) and consumed exactly once
/// by the turn engine.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// Backend announced its model and session token.
    SystemInit {
        /// Model identifier, when reported.
        model: Option<String>,
        /// Backend-side session token.
        session_token: String,
    },
    /// Assistant-authored text.
    AssistantDelta {
        /// Text fragment, forwarded to the client as-is.
        text: String,
    },
    /// The model asked for a local tool to be run.
    ToolRequest(ToolRequest),
    /// An assistant message closed with a non-null stop reason.
    AssistantStop {
        /// Raw backend stop-reason string.
        stop_reason_raw: String,
    },
    /// Terminal result of the backend's turn.
    TurnResult(TurnResult),
    /// Well-formed line of a kind this agent does not act on.
    Unknown {
        /// The line's `type` (and `subtype`, when meaningful).
        kind: String,
    },
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRequest {
    /// Backend tool-use identifier; must be echoed back byte-for-byte.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Tool input object.
    pub input: Value,
}

/// Terminal `result` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnResult {
    /// Result subtype (`success`, `error_max_turns`, `error_during_execution`, …).
    pub subtype: String,
    /// Raw stop-reason string, when the backend reports one on the result.
    pub stop_reason_raw: Option<String>,
    /// Tokens consumed by the backend for this turn.
    pub token_usage: TokenUsage,
    /// Backend flagged the result as an error.
    pub is_error: bool,
    /// Final result text, if any.
    pub result_text: Option<String>,
    /// Backend-side session token, if reported.
    pub session_token: Option<String>,
}

/// Token accounting reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenUsage {
    /// Prompt tokens.
    pub input_tokens: u64,
    /// Completion tokens.
    pub output_tokens: u64,
    /// Tokens written to the prompt cache.
    pub cache_creation_input_tokens: u64,
    /// Tokens served from the prompt cache.
    pub cache_read_input_tokens: u64,
}

impl TokenUsage {
    /// Tokens charged against a turn budget: input plus output.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// A backend line that could not be turned into an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedEvent {
    /// The offending line, verbatim.
    pub raw_line: String,
    /// Why it was rejected.
    pub reason: String,
}

impl MalformedEvent {
    pub(crate) fn new(raw_line: &str, reason: impl Into<String>) -> Self {
        Self {
            raw_line: raw_line.to_owned(),
            reason: reason.into(),
        }
    }
}

impl Display for MalformedEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "malformed backend line: {}", self.reason)
    }
}
