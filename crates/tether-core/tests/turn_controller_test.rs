//! Integration tests for the turn loop using MockProvider
//!
//! These drive the real Agent, dispatcher and sandbox against scripted
//! provider replies, with a temp dir as the working directory.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use tether_config::Config;
use tether_core::{Agent, AgentEvent};
use tether_providers::{ContentBlock, MessageContent, MessageRole, MockProvider, MockResponse, StreamEvent};
use tokio_util::sync::CancellationToken;

fn agent_with(provider: &MockProvider, dir: &TempDir, configure: impl FnOnce(&mut Config)) -> Agent {
    let mut config = Config::default();
    config.agent.working_dir = Some(dir.path().to_string_lossy().into_owned());
    configure(&mut config);
    Agent::new(&config, Arc::new(provider.clone()), None).unwrap()
}

fn kinds(events: &[AgentEvent]) -> Vec<&'static str> {
    events.iter().map(AgentEvent::kind).collect()
}

fn tool_results(events: &[AgentEvent]) -> Vec<(&str, bool, &serde_json::Value)> {
    events
        .iter()
        .filter_map(|e| match e {
            AgentEvent::ToolResult {
                tool_use_id,
                is_error,
                content,
                ..
            } => Some((tool_use_id.as_str(), *is_error, content)),
            _ => None,
        })
        .collect()
}

fn tool_use_ids(events: &[AgentEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|e| match e {
            AgentEvent::ToolUse { id, .. } => Some(id.as_str()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_text_only_reply_ends_with_done() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new().with_response(MockResponse::streaming(vec!["Hel", "lo!"]));
    let agent = agent_with(&provider, &dir, |_| {});

    let events = agent.run_collect("c1", "Hi", CancellationToken::new()).await;
    assert_eq!(kinds(&events), vec!["session_init", "text", "text", "done"]);
    match events.last().unwrap() {
        AgentEvent::Done { turns, notice, .. } => {
            assert_eq!(*turns, 1);
            assert!(notice.is_none());
        }
        other => panic!("expected done, got {:?}", other),
    }

    let history = agent.history("c1").await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].role, MessageRole::Assistant);
    assert_eq!(history[1].text(), "Hello!");
}

#[tokio::test]
async fn test_tool_call_round_trip_pairs_results() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("notes.txt"), "remember the milk\n").unwrap();

    let provider = MockProvider::new().with_responses(vec![
        MockResponse::text_then_tool("Let me look.", "read_file", json!({"path": "notes.txt"})),
        MockResponse::text("It says to remember the milk."),
    ]);
    let agent = agent_with(&provider, &dir, |_| {});

    let events = agent.run_collect("c1", "What's in notes.txt?", CancellationToken::new()).await;
    assert_eq!(
        kinds(&events),
        vec!["session_init", "text", "tool_use", "tool_result", "text", "done"]
    );

    let uses = tool_use_ids(&events);
    let results = tool_results(&events);
    assert_eq!(uses.len(), results.len());
    assert_eq!(uses[0], results[0].0);
    assert!(!results[0].1);
    assert_eq!(results[0].2["content"], "remember the milk\n");

    // The second request carries the assistant tool_use and the user tool_result
    let requests = provider.get_requests();
    assert_eq!(requests.len(), 2);
    let messages = &requests[1].messages;
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1].tool_use_ids(), vec![uses[0]]);
    assert_eq!(messages[2].role, MessageRole::User);
    assert_eq!(messages[2].tool_result_ids(), vec![uses[0]]);
}

#[tokio::test]
async fn test_multiple_tools_run_sequentially_in_order() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new().with_responses(vec![
        MockResponse::tool_uses(vec![
            ("write_file", json!({"path": "out.txt", "content": "first"})),
            ("read_file", json!({"path": "out.txt"})),
        ]),
        MockResponse::text("done"),
    ]);
    let agent = agent_with(&provider, &dir, |_| {});

    let events = agent.run_collect("c1", "write then read", CancellationToken::new()).await;
    let uses = tool_use_ids(&events);
    let results = tool_results(&events);
    assert_eq!(uses.len(), 2);
    assert_eq!(results.iter().map(|r| r.0).collect::<Vec<_>>(), uses);
    assert_eq!(results[1].2["content"], "first");

    let history = agent.history("c1").await;
    match &history[2].content {
        MessageContent::Blocks(blocks) => {
            assert_eq!(blocks.len(), 2);
            assert!(blocks.iter().all(|b| matches!(b, ContentBlock::ToolResult { .. })));
        }
        other => panic!("expected tool result blocks, got {:?}", other),
    }
}

#[tokio::test]
async fn test_max_turns_terminates_runaway_model() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new()
        .with_default_response(MockResponse::tool_use("no_such_tool", json!({"x": 1})));
    let agent = agent_with(&provider, &dir, |config| config.agent.max_turns = 3);

    let events = agent.run_collect("c1", "loop forever", CancellationToken::new()).await;
    assert_eq!(provider.request_count(), 3);
    assert_eq!(tool_use_ids(&events).len(), 3);
    assert!(tool_results(&events).iter().all(|(_, is_error, _)| *is_error));
    match events.last().unwrap() {
        AgentEvent::Done { turns, notice, .. } => {
            assert_eq!(*turns, 3);
            assert!(notice.as_deref().unwrap().contains("Maximum number of turns"));
        }
        other => panic!("expected done, got {:?}", other),
    }
}

#[tokio::test]
async fn test_provider_failure_aborts_with_single_error() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new().with_response(MockResponse::failure("overloaded"));
    let agent = agent_with(&provider, &dir, |_| {});

    let events = agent.run_collect("c1", "hi", CancellationToken::new()).await;
    assert_eq!(kinds(&events), vec!["session_init", "error"]);
    match &events[1] {
        AgentEvent::Error { message } => assert!(message.contains("overloaded")),
        other => panic!("expected error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_broken_stream_aborts_without_recording_reply() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new().with_responses(vec![
        MockResponse::broken(
            vec![StreamEvent::text_start(0), StreamEvent::text_delta(0, "partial")],
            "connection reset",
        ),
        MockResponse::text("second try"),
    ]);
    let agent = agent_with(&provider, &dir, |_| {});

    let events = agent.run_collect("c1", "first", CancellationToken::new()).await;
    assert_eq!(kinds(&events), vec!["session_init", "text", "error"]);
    assert_eq!(agent.history("c1").await.len(), 1);

    // The unanswered user message is merged with the next one
    let events = agent.run_collect("c1", "again", CancellationToken::new()).await;
    assert_eq!(kinds(&events).last(), Some(&"done"));
    let history = agent.history("c1").await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].text(), "first\n\nagain");
}

#[tokio::test]
async fn test_truncated_tool_input_reported_as_tool_error() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new().with_responses(vec![
        MockResponse::events(vec![
            StreamEvent::tool_use_start(0, "t1", "read_file"),
            StreamEvent::input_json_delta(0, "{\"path\":"),
            StreamEvent::block_stop(0),
            StreamEvent::stop("tool_use"),
            StreamEvent::MessageStop,
        ]),
        MockResponse::text("sorry"),
    ]);
    let agent = agent_with(&provider, &dir, |_| {});

    let events = agent.run_collect("c1", "read", CancellationToken::new()).await;
    let input = events.iter().find_map(|e| match e {
        AgentEvent::ToolUse { input, .. } => Some(input.clone()),
        _ => None,
    });
    assert_eq!(input, Some(json!({})));

    let results = tool_results(&events);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, "t1");
    assert!(results[0].1);
    assert!(results[0].2["error"].as_str().unwrap().contains("invalid input"));
    assert_eq!(kinds(&events).last(), Some(&"done"));
}

#[tokio::test]
async fn test_stream_cut_before_message_stop_runs_no_tools() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new().with_response(MockResponse::events(vec![
        StreamEvent::tool_use_start(0, "t1", "write_file"),
        StreamEvent::input_json_delta(0, "{\"path\":\"out.txt\",\"content\":\"x\"}"),
        StreamEvent::block_stop(0),
        StreamEvent::stop("tool_use"),
    ]));
    let agent = agent_with(&provider, &dir, |_| {});

    let events = agent.run_collect("c1", "write it", CancellationToken::new()).await;
    assert_eq!(kinds(&events).last(), Some(&"error"));
    assert!(tool_results(&events).is_empty());
    assert!(!dir.path().join("out.txt").exists());
    assert_eq!(agent.history("c1").await.len(), 1);
}

#[tokio::test]
async fn test_signed_thinking_is_sent_back_with_tool_use() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();
    let provider = MockProvider::new().with_responses(vec![
        MockResponse::events(vec![
            StreamEvent::thinking_start(0),
            StreamEvent::thinking_delta(0, "plan"),
            StreamEvent::signature_delta(0, "sig-1"),
            StreamEvent::block_stop(0),
            StreamEvent::tool_use_start(1, "t1", "read_file"),
            StreamEvent::input_json_delta(1, "{\"path\":\"a.txt\"}"),
            StreamEvent::block_stop(1),
            StreamEvent::stop("tool_use"),
            StreamEvent::MessageStop,
        ]),
        MockResponse::text("It says alpha."),
    ]);
    let agent = agent_with(&provider, &dir, |_| {});

    let events = agent.run_collect("c1", "read a.txt", CancellationToken::new()).await;
    assert_eq!(kinds(&events).last(), Some(&"done"));

    let requests = provider.get_requests();
    assert_eq!(requests.len(), 2);
    let assistant = &requests[1].messages[1];
    assert_eq!(assistant.role, MessageRole::Assistant);
    match &assistant.content {
        MessageContent::Blocks(blocks) => {
            assert_eq!(
                blocks[0],
                ContentBlock::Thinking {
                    thinking: "plan".to_string(),
                    signature: "sig-1".to_string(),
                }
            );
            assert!(matches!(&blocks[1], ContentBlock::ToolUse { id, .. } if id == "t1"));
        }
        other => panic!("expected blocks, got {:?}", other),
    }
}

#[tokio::test]
async fn test_cancel_during_tool_aborts_run() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new()
        .with_response(MockResponse::tool_use("run_shell", json!({"command": "sleep 30"})));
    let agent = agent_with(&provider, &dir, |_| {});

    let cancel = CancellationToken::new();
    let mut rx = agent.run("c1", "sleep", cancel.clone());
    let mut events = Vec::new();
    while let Some(event) = tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .unwrap()
    {
        if matches!(event, AgentEvent::ToolUse { .. }) {
            cancel.cancel();
        }
        events.push(event);
    }

    assert_eq!(
        kinds(&events),
        vec!["session_init", "tool_use", "tool_result", "error"]
    );
    let results = tool_results(&events);
    assert!(results[0].1);
    assert_eq!(results[0].2["error"], "cancelled");

    // Tool use and result are still paired in history
    let history = agent.history("c1").await;
    assert_eq!(history.len(), 3);
    assert_eq!(history[1].tool_use_ids(), history[2].tool_result_ids());
}

#[tokio::test]
async fn test_pre_cancelled_run_makes_no_provider_call() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new();
    let agent = agent_with(&provider, &dir, |_| {});

    let cancel = CancellationToken::new();
    cancel.cancel();
    let events = agent.run_collect("c1", "hi", cancel).await;
    assert_eq!(kinds(&events), vec!["session_init", "error"]);
    assert_eq!(provider.request_count(), 0);
}

#[tokio::test]
async fn test_conversations_are_independent() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new().with_default_response(MockResponse::text("ok"));
    let agent = agent_with(&provider, &dir, |_| {});

    agent.run_collect("a", "one", CancellationToken::new()).await;
    agent.run_collect("a", "two", CancellationToken::new()).await;
    agent.run_collect("b", "three", CancellationToken::new()).await;

    assert_eq!(agent.history("a").await.len(), 4);
    assert_eq!(agent.history("b").await.len(), 2);
    let requests = provider.get_requests();
    assert_eq!(requests[2].messages.len(), 1);

    agent.clear_session("a");
    assert!(agent.history("a").await.is_empty());
    assert_eq!(agent.session_ids(), vec!["b"]);
}
