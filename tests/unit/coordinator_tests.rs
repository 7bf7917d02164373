//! Unit tests for tool status sequencing.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use serde_json::{json, Value};

use acp_turn_agent::protocol::ToolRequest;
use acp_turn_agent::tools::{
    Tool, ToolCallContent, ToolCallStatus, ToolContext, ToolCoordinator, ToolError,
    ToolInvocation, ToolOutput, ToolRegistry,
};

struct EchoTool;

impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the `text` field"
    }

    fn call(
        &self,
        input: Value,
        _context: ToolContext,
    ) -> BoxFuture<'static, Result<ToolOutput, ToolError>> {
        Box::pin(async move {
            input
                .get("text")
                .and_then(Value::as_str)
                .map(ToolOutput::text)
                .ok_or_else(|| ToolError::Runtime("no text".into()))
        })
    }
}

struct PanickingTool;

impl Tool for PanickingTool {
    fn name(&self) -> &str {
        "boom"
    }

    fn description(&self) -> &str {
        "Panics"
    }

    fn call(
        &self,
        _input: Value,
        _context: ToolContext,
    ) -> BoxFuture<'static, Result<ToolOutput, ToolError>> {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(1)).await;
            panic!("tool exploded")
        })
    }
}

fn coordinator() -> ToolCoordinator {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(EchoTool)).expect("register echo");
    registry.register(Arc::new(PanickingTool)).expect("register boom");
    ToolCoordinator::new(Arc::new(registry))
}

fn request(name: &str, input: Value) -> ToolRequest {
    ToolRequest {
        id: "toolu_42".into(),
        name: name.into(),
        input,
    }
}

#[tokio::test]
async fn successful_tool_yields_pending_in_progress_completed() {
    let updates: Vec<_> = coordinator()
        .execute("s-1", request("echo", json!({ "text": "hi" })))
        .into_stream()
        .collect()
        .await;

    let statuses: Vec<_> = updates.iter().map(|u| u.status).collect();
    assert_eq!(
        statuses,
        vec![
            ToolCallStatus::Pending,
            ToolCallStatus::InProgress,
            ToolCallStatus::Completed
        ]
    );
    assert!(updates.iter().all(|u| u.tool_call_id == "toolu_42"));
    assert_eq!(updates[0].raw_input, Some(json!({ "text": "hi" })));
    assert_eq!(
        updates[2].content,
        Some(ToolCallContent::Text { text: "hi".into() })
    );
}

#[tokio::test]
async fn unknown_tool_fails_without_in_progress() {
    let updates: Vec<_> = coordinator()
        .execute("s-1", request("missing", json!({})))
        .into_stream()
        .collect()
        .await;

    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0].status, ToolCallStatus::Pending);
    assert_eq!(updates[1].status, ToolCallStatus::Failed);
    assert_eq!(
        updates[1].content,
        Some(ToolCallContent::Error {
            error: ToolError::NotFound("missing".into())
        })
    );
}

#[tokio::test]
async fn invalid_input_fails_before_running() {
    let updates: Vec<_> = coordinator()
        .execute("s-1", request("echo", json!("not an object")))
        .into_stream()
        .collect()
        .await;

    let statuses: Vec<_> = updates.iter().map(|u| u.status).collect();
    assert_eq!(statuses, vec![ToolCallStatus::Pending, ToolCallStatus::Failed]);
}

#[tokio::test]
async fn tool_runtime_error_is_failed_status() {
    let updates: Vec<_> = coordinator()
        .execute("s-1", request("echo", json!({})))
        .into_stream()
        .collect()
        .await;

    let last = updates.last().expect("terminal update");
    assert_eq!(last.status, ToolCallStatus::Failed);
    let (text, is_error) = last.content.as_ref().expect("content").to_result_text();
    assert!(is_error);
    assert_eq!(text, "tool error: no text");
}

#[tokio::test]
async fn panicking_tool_is_reported_as_failure() {
    let mut execution = coordinator().execute("s-1", request("boom", json!({})));

    let mut last = None;
    while let Some(update) = execution.next_update().await {
        last = Some(update);
    }

    assert_eq!(last.expect("terminal").status, ToolCallStatus::Failed);
    assert_eq!(execution.invocation().status(), ToolCallStatus::Failed);
    assert!(execution.next_update().await.is_none(), "not restartable");
}

#[test]
fn invocation_rejects_backward_transitions() {
    let mut invocation = ToolInvocation::new("t1");

    invocation.start().expect("pending -> in_progress");
    assert!(invocation.start().is_err());
    invocation
        .finish(ToolCallContent::Text { text: "ok".into() })
        .expect("in_progress -> completed");
    assert!(invocation
        .finish(ToolCallContent::Text { text: "again".into() })
        .is_err());
    assert_eq!(invocation.status(), ToolCallStatus::Completed);
}

#[test]
fn registry_rejects_duplicates_and_lists_sorted() {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(EchoTool)).expect("first");
    registry.register(Arc::new(PanickingTool)).expect("second");

    assert!(registry.register(Arc::new(EchoTool)).is_err());
    assert_eq!(registry.names(), vec!["boom", "echo"]);
    assert_eq!(registry.len(), 2);
}

#[test]
fn builtin_registry_has_file_tools() {
    let temp = tempfile::tempdir().expect("tempdir");

    let registry = ToolRegistry::with_builtin_tools(temp.path()).expect("builtins");

    assert_eq!(registry.names(), vec!["list_directory", "read_file"]);
}

#[tokio::test]
async fn abandoned_execution_closes_with_one_failed_update() {
    let mut execution = coordinator().execute("s-1", request("echo", json!({ "text": "hi" })));
    execution.next_update().await.expect("pending");
    execution.next_update().await.expect("in_progress");

    let closing = execution.abandon("cancelled").expect("terminal update");

    assert_eq!(closing.status, ToolCallStatus::Failed);
    assert_eq!(
        closing.content,
        Some(ToolCallContent::Error {
            error: ToolError::Runtime("cancelled".into())
        })
    );
    assert_eq!(execution.invocation().status(), ToolCallStatus::Failed);
    assert!(execution.next_update().await.is_none());
    assert!(execution.abandon("cancelled").is_none());
}

#[tokio::test]
async fn abandon_before_announcement_emits_nothing() {
    let mut execution = coordinator().execute("s-1", request("echo", json!({ "text": "hi" })));

    assert!(execution.abandon("cancelled").is_none());
    assert!(execution.next_update().await.is_none());
}
