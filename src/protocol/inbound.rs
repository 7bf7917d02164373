//! Inbound backend line parsing.
//!
//! # Known inbound kinds
//!
//! | `type`      | Maps to                                                   |
//! |-------------|-----------------------------------------------------------|
//! | `system`    | [`BackendEvent::SystemInit`] for `subtype: "init"`        |
//! | `assistant` | [`BackendEvent::AssistantDelta`] / [`BackendEvent::ToolRequest`] per block, then [`BackendEvent::AssistantStop`] |
//! | `result`    | [`BackendEvent::TurnResult`]                              |
//! | *(other)*   | [`BackendEvent::Unknown`]; the engine ignores it          |

use serde::Deserialize;
use serde_json::Value;

use super::events::{BackendEvent, MalformedEvent, TokenUsage, ToolRequest, TurnResult};

// ── Inbound line shapes ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SystemInitLine {
    session_id: String,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssistantLine {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: MessageContent,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Blocks(Vec<AssistantBlock>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AssistantBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ResultLine {
    subtype: String,
    #[serde(default)]
    is_error: bool,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    usage: Option<TokenUsage>,
    #[serde(default)]
    stop_reason: Option<String>,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Parse one line of backend output.
///
/// # Return value
///
/// - `Ok(events)`: the events carried by the line, in order. Empty for a
///   blank line or an assistant message without actionable blocks.
///   Unrecognised kinds come back as a single [`BackendEvent::Unknown`].
///
/// # Errors
///
/// Returns a [`MalformedEvent`] when the line is not a JSON object, has no
/// string `type`, or is a known kind missing a required field.
pub fn parse_line(line: &str) -> Result<Vec<BackendEvent>, MalformedEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let value: Value = serde_json::from_str(trimmed)
        .map_err(|e| MalformedEvent::new(line, format!("invalid json: {e}")))?;

    let Some(kind) = value.get("type").and_then(Value::as_str).map(str::to_owned) else {
        return Err(MalformedEvent::new(line, "missing string field `type`"));
    };

    match kind.as_str() {
        "system" => parse_system(line, value),
        "assistant" => parse_assistant(line, value),
        "result" => parse_result(line, value),
        other => Ok(vec![BackendEvent::Unknown {
            kind: other.to_owned(),
        }]),
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

fn parse_system(line: &str, value: Value) -> Result<Vec<BackendEvent>, MalformedEvent> {
    let subtype = value
        .get("subtype")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();

    if subtype != "init" {
        return Ok(vec![BackendEvent::Unknown {
            kind: format!("system/{subtype}"),
        }]);
    }

    let init: SystemInitLine = serde_json::from_value(value)
        .map_err(|e| MalformedEvent::new(line, format!("system init: {e}")))?;

    Ok(vec![BackendEvent::SystemInit {
        model: init.model,
        session_token: init.session_id,
    }])
}

fn parse_assistant(line: &str, value: Value) -> Result<Vec<BackendEvent>, MalformedEvent> {
    let parsed: AssistantLine = serde_json::from_value(value)
        .map_err(|e| MalformedEvent::new(line, format!("assistant message: {e}")))?;

    let mut events = Vec::new();
    match parsed.message.content {
        MessageContent::Text(text) => {
            if !text.is_empty() {
                events.push(BackendEvent::AssistantDelta { text });
            }
        }
        MessageContent::Blocks(blocks) => {
            for block in blocks {
                match block {
                    AssistantBlock::Text { text } if !text.is_empty() => {
                        events.push(BackendEvent::AssistantDelta { text });
                    }
                    AssistantBlock::ToolUse { id, name, input } => {
                        events.push(BackendEvent::ToolRequest(ToolRequest { id, name, input }));
                    }
                    AssistantBlock::Text { .. } | AssistantBlock::Other => {}
                }
            }
        }
    }

    if let Some(stop_reason_raw) = parsed.message.stop_reason {
        events.push(BackendEvent::AssistantStop { stop_reason_raw });
    }

    Ok(events)
}

fn parse_result(line: &str, value: Value) -> Result<Vec<BackendEvent>, MalformedEvent> {
    let parsed: ResultLine = serde_json::from_value(value)
        .map_err(|e| MalformedEvent::new(line, format!("result: {e}")))?;

    Ok(vec![BackendEvent::TurnResult(TurnResult {
        subtype: parsed.subtype,
        stop_reason_raw: parsed.stop_reason,
        token_usage: parsed.usage.unwrap_or_default(),
        is_error: parsed.is_error,
        result_text: parsed.result,
        session_token: parsed.session_id,
    })])
}
