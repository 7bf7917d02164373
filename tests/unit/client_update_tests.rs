//! Unit tests for the client-facing slice: prompt translation and
//! JSON-RPC rendering of updates.

use serde_json::{json, Value};

use acp_turn_agent::client::emitter::to_json_rpc;
use acp_turn_agent::client::{
    prompt_to_user_content, ChannelEmitter, EmbeddedResource, NdjsonEmitter, PromptBlock,
    UpdateEmitter,
};
use acp_turn_agent::protocol::UserContent;
use acp_turn_agent::tools::{ToolCallContent, ToolCallStatus, ToolCallUpdate};
use acp_turn_agent::turn::{ClientUpdate, StopReason};

#[test]
fn single_text_prompt_is_plain_text() {
    let content = prompt_to_user_content(&[PromptBlock::Text {
        text: "What is 2+2?".into(),
    }]);

    assert_eq!(content, UserContent::Text("What is 2+2?".into()));
}

#[test]
fn mixed_prompt_becomes_blocks_in_order() {
    let content = prompt_to_user_content(&[
        PromptBlock::Text {
            text: "Summarise".into(),
        },
        PromptBlock::ResourceLink {
            uri: "file:///w/a.rs".into(),
            name: "a.rs".into(),
        },
        PromptBlock::Resource {
            resource: EmbeddedResource {
                uri: "file:///w/b.rs".into(),
                text: Some("fn b() {}".into()),
                mime_type: None,
            },
        },
    ]);

    let UserContent::Blocks(blocks) = content else {
        panic!("expected blocks");
    };
    assert_eq!(blocks.len(), 3);
    assert_eq!(blocks[0], json!({ "type": "text", "text": "Summarise" }));
    assert_eq!(blocks[1]["text"], "[@a.rs](file:///w/a.rs)");
    assert!(blocks[2]["text"]
        .as_str()
        .expect("text")
        .starts_with("<context ref=\"file:///w/b.rs\">"));
}

#[test]
fn prompt_blocks_deserialize_from_client_json() {
    let blocks: Vec<PromptBlock> = serde_json::from_value(json!([
        { "type": "text", "text": "hi" },
        { "type": "image", "data": "AAAA", "mimeType": "image/png" }
    ]))
    .expect("deserialize");

    let UserContent::Blocks(content) = prompt_to_user_content(&blocks) else {
        panic!("expected blocks");
    };
    assert_eq!(content[1]["source"]["media_type"], "image/png");
}

#[test]
fn content_chunk_is_agent_message_chunk() {
    let message = to_json_rpc(
        "s-1",
        &ClientUpdate::ContentChunk { text: "4".into() },
        &json!(1),
    );

    assert_eq!(message["method"], "session/update");
    assert_eq!(message["params"]["sessionId"], "s-1");
    assert_eq!(message["params"]["update"]["sessionUpdate"], "agent_message_chunk");
    assert_eq!(message["params"]["update"]["content"]["text"], "4");
}

#[test]
fn pending_tool_is_tool_call_and_later_statuses_are_updates() {
    let pending = ToolCallUpdate {
        tool_call_id: "t1".into(),
        tool_name: "read_file".into(),
        status: ToolCallStatus::Pending,
        raw_input: Some(json!({ "path": "a.txt" })),
        content: None,
    };
    let done = ToolCallUpdate {
        status: ToolCallStatus::Completed,
        raw_input: None,
        content: Some(ToolCallContent::Text {
            text: "hello".into(),
        }),
        ..pending.clone()
    };

    let first = to_json_rpc("s-1", &ClientUpdate::ToolCallStatus(pending), &json!(1));
    let last = to_json_rpc("s-1", &ClientUpdate::ToolCallStatus(done), &json!(1));

    assert_eq!(first["params"]["update"]["sessionUpdate"], "tool_call");
    assert_eq!(first["params"]["update"]["status"], "pending");
    assert_eq!(first["params"]["update"]["rawInput"]["path"], "a.txt");
    assert_eq!(last["params"]["update"]["sessionUpdate"], "tool_call_update");
    assert_eq!(last["params"]["update"]["status"], "completed");
    assert_eq!(
        last["params"]["update"]["content"][0]["content"]["text"],
        "hello"
    );
}

#[test]
fn stop_reason_answers_the_prompt_request() {
    let message = to_json_rpc(
        "s-1",
        &ClientUpdate::StopReasonReached {
            stop_reason: StopReason::MaxTurnRequests,
        },
        &json!(7),
    );

    assert_eq!(message["id"], 7);
    assert_eq!(message["result"]["stopReason"], "max_turn_requests");
}

#[tokio::test]
async fn ndjson_emitter_writes_one_line_per_update() {
    let (writer, mut reader) = tokio::io::duplex(4096);
    let emitter = NdjsonEmitter::new(writer, json!(1));

    emitter
        .emit("s-1", ClientUpdate::ContentChunk { text: "a".into() })
        .await
        .expect("emit chunk");
    emitter
        .emit(
            "s-1",
            ClientUpdate::StopReasonReached {
                stop_reason: StopReason::EndTurn,
            },
        )
        .await
        .expect("emit stop");
    drop(emitter);

    let mut raw = String::new();
    tokio::io::AsyncReadExt::read_to_string(&mut reader, &mut raw)
        .await
        .expect("read");
    let lines: Vec<Value> = raw
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1]["result"]["stopReason"], "end_turn");
}

#[tokio::test]
async fn channel_emitter_errors_once_receiver_is_gone() {
    let (emitter, rx) = ChannelEmitter::new(1);
    drop(rx);

    let result = emitter
        .emit("s-1", ClientUpdate::ContentChunk { text: "x".into() })
        .await;

    assert!(result.is_err());
}
