//! Error types shared across the agent.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all hard failure modes.
///
/// Budget exhaustion, cancellation, and refusal are not errors: they are
/// reported as a [`StopReason`](crate::turn::StopReason). Tool failures are
/// reported as data through [`ToolError`](crate::tools::ToolError).
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Backend infrastructure failure: spawn failure, unexpected exit, broken pipe.
    Backend(String),
    /// The backend delivered a terminal result flagged as an error.
    BackendReported(String),
    /// Backend stream framing failure or a malformed line under strict mode.
    Protocol(String),
    /// Tool registration or lookup misuse.
    Tool(String),
    /// File system path failed validation against the workspace root.
    PathViolation(String),
    /// A prompt arrived for a session that already has a turn in flight.
    TurnActive(String),
    /// A tool result was keyed by an identifier other than its request's.
    ToolCallMismatch {
        /// Identifier carried by the originating tool request.
        expected: String,
        /// Identifier the caller attempted to reply with.
        actual: String,
    },
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Backend(msg) => write!(f, "backend: {msg}"),
            Self::BackendReported(msg) => write!(f, "backend reported error: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Tool(msg) => write!(f, "tool: {msg}"),
            Self::PathViolation(msg) => write!(f, "path violation: {msg}"),
            Self::TurnActive(msg) => write!(f, "turn active: {msg}"),
            Self::ToolCallMismatch { expected, actual } => write!(
                f,
                "tool call mismatch: result for '{actual}' does not match request '{expected}'"
            ),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
