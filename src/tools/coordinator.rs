//! Tool execution coordinator.
//!
//! [`ToolCoordinator::execute`] turns one [`ToolRequest`] into a
//! [`ToolExecution`]: a lazy, single-use sequence of status updates.
//!
//! | Step | Update                   | Side effect                     |
//! |------|--------------------------|---------------------------------|
//! | 1    | `pending`                | none                            |
//! | 2    | `in_progress`            | tool task spawned               |
//! | 3    | `completed` / `failed`   | tool result recorded            |
//!
//! Unknown tools and rejected input go straight from `pending` to `failed`.
//! Failures are data: the coordinator never ends a turn and never decides
//! a stop reason.

use std::sync::Arc;

use futures_util::Stream;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{Tool, ToolContext, ToolError, ToolOutput, ToolRegistry};
use crate::protocol::ToolRequest;
use crate::{AppError, Result};

/// Lifecycle status of one tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    /// Announced, nothing has run yet.
    Pending,
    /// The tool is running.
    InProgress,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

impl ToolCallStatus {
    /// `true` for `Completed` and `Failed`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::InProgress => 1,
            Self::Completed | Self::Failed => 2,
        }
    }
}

/// Terminal payload of an invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolCallContent {
    /// Tool output text.
    Text {
        /// Output returned by the tool.
        text: String,
    },
    /// Structured failure.
    Error {
        /// Failure details.
        error: ToolError,
    },
}

impl ToolCallContent {
    /// Text fed back to the model, and whether it describes a failure.
    #[must_use]
    pub fn to_result_text(&self) -> (String, bool) {
        match self {
            Self::Text { text } => (text.clone(), false),
            Self::Error { error } => (error.to_string(), true),
        }
    }
}

/// One status notification for a tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolCallUpdate {
    /// Backend tool-use identifier, verbatim.
    pub tool_call_id: String,
    /// Tool name as requested.
    pub tool_name: String,
    /// New status.
    pub status: ToolCallStatus,
    /// Tool input; carried on the `pending` update only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_input: Option<Value>,
    /// Result; carried on terminal updates only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<ToolCallContent>,
}

/// Status bookkeeping for one invocation.
///
/// Transitions only move forward (`pending → in_progress → terminal`,
/// with `in_progress` optional) and a terminal status is final.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    tool_call_id: String,
    status: ToolCallStatus,
    result: Option<ToolCallContent>,
}

impl ToolInvocation {
    /// New invocation in `pending`.
    #[must_use]
    pub fn new(tool_call_id: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            status: ToolCallStatus::Pending,
            result: None,
        }
    }

    /// Move to `in_progress`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Tool` if the invocation is already past `pending`.
    pub fn start(&mut self) -> Result<()> {
        self.advance(ToolCallStatus::InProgress)
    }

    /// Move to a terminal status carrying `result`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Tool` if the invocation is already terminal.
    pub fn finish(&mut self, result: ToolCallContent) -> Result<()> {
        let status = match result {
            ToolCallContent::Text { .. } => ToolCallStatus::Completed,
            ToolCallContent::Error { .. } => ToolCallStatus::Failed,
        };
        self.advance(status)?;
        self.result = Some(result);
        Ok(())
    }

    fn advance(&mut self, next: ToolCallStatus) -> Result<()> {
        if next.rank() <= self.status.rank() {
            return Err(AppError::Tool(format!(
                "invalid status transition for '{}': {:?} -> {:?}",
                self.tool_call_id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    /// Backend tool-use identifier.
    #[must_use]
    pub fn tool_call_id(&self) -> &str {
        &self.tool_call_id
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> ToolCallStatus {
        self.status
    }

    /// Terminal result, once recorded.
    #[must_use]
    pub fn result(&self) -> Option<&ToolCallContent> {
        self.result.as_ref()
    }
}

/// Resolves tool requests against a registry.
#[derive(Debug, Clone)]
pub struct ToolCoordinator {
    registry: Arc<ToolRegistry>,
}

impl ToolCoordinator {
    /// Coordinator over `registry`.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// The registry tools are resolved against.
    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Begin executing `request` on behalf of `session_id`.
    ///
    /// Nothing runs until the first update has been taken from the
    /// returned [`ToolExecution`].
    #[must_use]
    pub fn execute(&self, session_id: &str, request: ToolRequest) -> ToolExecution {
        let tool = self.registry.get(&request.name);
        ToolExecution {
            invocation: ToolInvocation::new(request.id.clone()),
            context: ToolContext {
                session_id: session_id.to_owned(),
                tool_call_id: request.id.clone(),
            },
            request,
            tool,
            phase: Phase::Announce,
        }
    }
}

enum Phase {
    Announce,
    Start,
    Running(JoinHandle<std::result::Result<ToolOutput, ToolError>>),
    Finished,
}

/// Status sequence for one tool request.
///
/// Yields `pending` first, then (optionally) `in_progress`, then exactly
/// one terminal update, then `None` forever. Not restartable.
pub struct ToolExecution {
    request: ToolRequest,
    tool: Option<Arc<dyn Tool>>,
    context: ToolContext,
    invocation: ToolInvocation,
    phase: Phase,
}

impl ToolExecution {
    /// The request being executed.
    #[must_use]
    pub fn request(&self) -> &ToolRequest {
        &self.request
    }

    /// Current invocation bookkeeping.
    #[must_use]
    pub fn invocation(&self) -> &ToolInvocation {
        &self.invocation
    }

    /// Next status update, or `None` once the terminal one was yielded.
    ///
    /// Cancel-safe: dropping the returned future while the tool runs leaves
    /// the execution where it was.
    pub async fn next_update(&mut self) -> Option<ToolCallUpdate> {
        match &mut self.phase {
            Phase::Announce => {
                self.phase = Phase::Start;
                Some(self.update(ToolCallStatus::Pending))
            }
            Phase::Start => Some(self.start()),
            Phase::Running(handle) => {
                let outcome = handle.await;
                let content = match outcome {
                    Ok(Ok(output)) => ToolCallContent::Text { text: output.text },
                    Ok(Err(error)) => ToolCallContent::Error { error },
                    Err(join_err) => {
                        warn!(
                            tool_call_id = self.request.id.as_str(),
                            error = %join_err,
                            "tool task aborted"
                        );
                        ToolCallContent::Error {
                            error: ToolError::Runtime(format!("tool task aborted: {join_err}")),
                        }
                    }
                };
                Some(self.finish(content))
            }
            Phase::Finished => None,
        }
    }

    /// Close an execution nobody will wait for.
    ///
    /// A running tool is detached, not interrupted: it may finish, but its
    /// result is never observed. Returns the `failed` update carrying
    /// [`ToolError::Runtime`]`(reason)`, or `None` if nothing was announced
    /// yet or the terminal update was already yielded.
    pub fn abandon(&mut self, reason: &str) -> Option<ToolCallUpdate> {
        match std::mem::replace(&mut self.phase, Phase::Finished) {
            Phase::Announce | Phase::Finished => None,
            Phase::Start => Some(self.finish(ToolCallContent::Error {
                error: ToolError::Runtime(reason.to_owned()),
            })),
            Phase::Running(_detached) => {
                debug!(
                    tool_call_id = self.request.id.as_str(),
                    reason, "tool execution abandoned"
                );
                Some(self.finish(ToolCallContent::Error {
                    error: ToolError::Runtime(reason.to_owned()),
                }))
            }
        }
    }

    /// Adapt into a [`Stream`] of updates.
    pub fn into_stream(self) -> impl Stream<Item = ToolCallUpdate> + Send {
        futures_util::stream::unfold(self, |mut execution| async move {
            execution
                .next_update()
                .await
                .map(|update| (update, execution))
        })
    }

    fn start(&mut self) -> ToolCallUpdate {
        let Some(tool) = self.tool.clone() else {
            let error = ToolError::NotFound(self.request.name.clone());
            return self.finish(ToolCallContent::Error { error });
        };

        if let Err(error) = tool.validate_input(&self.request.input) {
            return self.finish(ToolCallContent::Error { error });
        }

        if let Err(err) = self.invocation.start() {
            warn!(error = %err, "tool invocation out of order");
        }

        debug!(
            tool_call_id = self.request.id.as_str(),
            tool = self.request.name.as_str(),
            "tool execution started"
        );
        let future = tool.call(self.request.input.clone(), self.context.clone());
        self.phase = Phase::Running(tokio::spawn(future));
        self.update(ToolCallStatus::InProgress)
    }

    fn finish(&mut self, content: ToolCallContent) -> ToolCallUpdate {
        if let Err(err) = self.invocation.finish(content.clone()) {
            warn!(error = %err, "tool invocation out of order");
        }
        self.phase = Phase::Finished;
        let mut update = self.update(self.invocation.status());
        update.content = Some(content);
        update
    }

    fn update(&self, status: ToolCallStatus) -> ToolCallUpdate {
        ToolCallUpdate {
            tool_call_id: self.request.id.clone(),
            tool_name: self.request.name.clone(),
            status,
            raw_input: (status == ToolCallStatus::Pending).then(|| self.request.input.clone()),
            content: None,
        }
    }
}
