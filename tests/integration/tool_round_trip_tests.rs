//! Integration tests for turns that dispatch local tools.

use serde_json::json;
use tokio_util::sync::CancellationToken;

use acp_turn_agent::config::TurnConfig;
use acp_turn_agent::protocol::{OutboundMessage, UserContent};
use acp_turn_agent::tools::{ToolCallStatus, ToolRegistry};
use acp_turn_agent::turn::{ClientUpdate, StopReason};

use super::test_helpers::{
    drain, engine_with, link, result_line, test_config, text_line, tool_use_line, SESSION,
};

fn statuses_for(updates: &[ClientUpdate], tool_call_id: &str) -> Vec<ToolCallStatus> {
    updates
        .iter()
        .filter_map(|update| match update {
            ClientUpdate::ToolCallStatus(tool) if tool.tool_call_id == tool_call_id => {
                Some(tool.status)
            }
            _ => None,
        })
        .collect()
}

/// The model reads a file; the result goes back keyed by the model's id.
#[tokio::test]
async fn read_file_round_trip() {
    let workspace = tempfile::tempdir().expect("tempdir");
    std::fs::write(workspace.path().join("a.txt"), "hello\n").expect("write fixture");
    let registry = ToolRegistry::with_builtin_tools(workspace.path()).expect("builtins");
    let (engine, mut updates) = engine_with(test_config(), registry);
    let (mut link, mut backend) = link();
    let mut turn = engine.new_turn(SESSION);
    let cancel = CancellationToken::new();

    let script = async {
        backend.next_outbound().await;
        backend
            .line(&tool_use_line("t1", "read_file", &json!({ "path": "a.txt" })))
            .await;
        let tool_result = backend.next_outbound().await;
        backend.line(&text_line("The file says hello.", Some("end_turn"))).await;
        backend.line(&result_line("success", false, 40, 10)).await;
        tool_result
    };

    let (outcome, tool_result) = tokio::join!(
        engine.run_turn(
            &mut turn,
            &mut link,
            UserContent::Text("Read a.txt".into()),
            &cancel
        ),
        script
    );

    assert_eq!(outcome.expect("turn succeeds"), StopReason::EndTurn);

    let OutboundMessage::ToolResult(result) = tool_result else {
        panic!("expected a tool result, got {tool_result:?}");
    };
    assert_eq!(result.tool_use_id(), "t1");
    assert_eq!(result.text(), "hello\n");
    assert!(!result.is_error());

    let emitted = drain(&mut updates);
    assert_eq!(
        statuses_for(&emitted, "t1"),
        vec![
            ToolCallStatus::Pending,
            ToolCallStatus::InProgress,
            ToolCallStatus::Completed
        ]
    );
    assert_eq!(
        emitted.last(),
        Some(&ClientUpdate::StopReasonReached {
            stop_reason: StopReason::EndTurn
        })
    );

    assert_eq!(turn.round_trips().len(), 1);
    assert_eq!(turn.round_trips()[0].tool_call_id, "t1");
    assert_eq!(
        turn.round_trips()[0].outcome,
        Some(ToolCallStatus::Completed)
    );
    assert_eq!(turn.budget().round_trips(), 1);
}

/// A failing tool is data: the model gets an error result and the turn goes on.
#[tokio::test]
async fn unknown_tool_reports_failure_and_turn_continues() {
    let (engine, mut updates) = engine_with(test_config(), ToolRegistry::new());
    let (mut link, mut backend) = link();
    let mut turn = engine.new_turn(SESSION);
    let cancel = CancellationToken::new();

    let script = async {
        backend.next_outbound().await;
        backend
            .line(&tool_use_line("toolu_x", "does_not_exist", &json!({})))
            .await;
        let tool_result = backend.next_outbound().await;
        backend.line(&text_line("That tool is missing.", Some("end_turn"))).await;
        backend.line(&result_line("success", false, 1, 1)).await;
        tool_result
    };

    let (outcome, tool_result) = tokio::join!(
        engine.run_turn(&mut turn, &mut link, UserContent::Text("go".into()), &cancel),
        script
    );

    assert_eq!(outcome.expect("turn succeeds"), StopReason::EndTurn);
    let OutboundMessage::ToolResult(result) = tool_result else {
        panic!("expected a tool result");
    };
    assert_eq!(result.tool_use_id(), "toolu_x");
    assert!(result.is_error());
    assert!(result.text().contains("does_not_exist"));
    assert_eq!(
        statuses_for(&drain(&mut updates), "toolu_x"),
        vec![ToolCallStatus::Pending, ToolCallStatus::Failed]
    );
}

/// With a ceiling of one round-trip, the second request is never dispatched.
#[tokio::test]
async fn round_trip_ceiling_stops_before_second_dispatch() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let registry = ToolRegistry::with_builtin_tools(workspace.path()).expect("builtins");
    let config = TurnConfig {
        max_turn_requests: Some(1),
        ..test_config()
    };
    let (engine, mut updates) = engine_with(config, registry);
    let (mut link, mut backend) = link();
    let mut turn = engine.new_turn(SESSION);
    let cancel = CancellationToken::new();

    let script = async {
        backend.next_outbound().await;
        backend
            .line(&tool_use_line("t1", "list_directory", &json!({})))
            .await;
        let first = backend.next_outbound().await;
        backend
            .line(&tool_use_line("t2", "list_directory", &json!({})))
            .await;
        let before_interrupt = backend.until_interrupt().await;
        backend
            .line(&result_line("error_during_execution", true, 1, 1))
            .await;
        (first, before_interrupt)
    };

    let (outcome, (first, before_interrupt)) = tokio::join!(
        engine.run_turn(&mut turn, &mut link, UserContent::Text("explore".into()), &cancel),
        script
    );

    assert_eq!(outcome.expect("turn succeeds"), StopReason::MaxTurnRequests);
    assert!(matches!(first, OutboundMessage::ToolResult(ref r) if r.tool_use_id() == "t1"));
    assert!(
        before_interrupt.is_empty(),
        "no tool result for t2 may be sent: {before_interrupt:?}"
    );

    let emitted = drain(&mut updates);
    assert_eq!(statuses_for(&emitted, "t1").len(), 3);
    assert!(statuses_for(&emitted, "t2").is_empty(), "t2 never dispatched");
    assert_eq!(
        emitted.last(),
        Some(&ClientUpdate::StopReasonReached {
            stop_reason: StopReason::MaxTurnRequests
        })
    );
    assert_eq!(turn.round_trips().len(), 1);
}

/// Several tool requests in one assistant message are served in order.
#[tokio::test]
async fn multiple_tool_requests_in_one_message_run_in_order() {
    let workspace = tempfile::tempdir().expect("tempdir");
    std::fs::write(workspace.path().join("a.txt"), "A").expect("write a");
    std::fs::write(workspace.path().join("b.txt"), "B").expect("write b");
    let registry = ToolRegistry::with_builtin_tools(workspace.path()).expect("builtins");
    let (engine, _updates) = engine_with(test_config(), registry);
    let (mut link, mut backend) = link();
    let mut turn = engine.new_turn(SESSION);
    let cancel = CancellationToken::new();

    let script = async {
        backend.next_outbound().await;
        backend
            .line(
                r#"{"type":"assistant","message":{"stop_reason":"tool_use","content":[
                    {"type":"tool_use","id":"ta","name":"read_file","input":{"path":"a.txt"}},
                    {"type":"tool_use","id":"tb","name":"read_file","input":{"path":"b.txt"}}
                ]}}"#
                    .replace('\n', "")
                    .as_str(),
            )
            .await;
        let first = backend.next_outbound().await;
        let second = backend.next_outbound().await;
        backend.line(&result_line("success", false, 1, 1)).await;
        (first, second)
    };

    let (outcome, (first, second)) = tokio::join!(
        engine.run_turn(&mut turn, &mut link, UserContent::Text("both".into()), &cancel),
        script
    );

    assert_eq!(outcome.expect("turn succeeds"), StopReason::EndTurn);
    let ids: Vec<(String, String)> = [first, second]
        .into_iter()
        .map(|message| match message {
            OutboundMessage::ToolResult(r) => (r.tool_use_id().to_owned(), r.text().to_owned()),
            other => panic!("expected tool result, got {other:?}"),
        })
        .collect();
    assert_eq!(
        ids,
        vec![
            ("ta".to_owned(), "A".to_owned()),
            ("tb".to_owned(), "B".to_owned())
        ]
    );
    assert_eq!(turn.budget().round_trips(), 2);
}
