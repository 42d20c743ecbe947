//! Approval and deletion flows end to end: the model asks, the sandbox
//! defers, the user decides, the model retries.

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use tether_config::Config;
use tether_core::{
    Agent, AgentEvent, CapabilityGate, Classification, DeletionError, GateError, Operation,
    SessionStore,
};
use tether_providers::{MockProvider, MockResponse};
use tokio_util::sync::CancellationToken;

fn agent_with(provider: &MockProvider, dir: &TempDir, extra_sensitive: Vec<String>) -> Agent {
    let mut config = Config::default();
    config.agent.working_dir = Some(dir.path().to_string_lossy().into_owned());
    config.sandbox.extra_sensitive_paths = extra_sensitive;
    Agent::new(&config, Arc::new(provider.clone()), None).unwrap()
}

fn first_result(events: &[AgentEvent]) -> (bool, serde_json::Value) {
    events
        .iter()
        .find_map(|e| match e {
            AgentEvent::ToolResult {
                is_error, content, ..
            } => Some((*is_error, content.clone())),
            _ => None,
        })
        .expect("no tool result")
}

#[tokio::test]
async fn test_sensitive_write_waits_for_approval_then_succeeds() {
    let dir = TempDir::new().unwrap();
    let secret = dir.path().join("secret");
    let target = secret.join("plan.txt");
    let write = json!({"path": target.to_string_lossy(), "content": "v1"});

    let provider = MockProvider::new().with_responses(vec![
        MockResponse::tool_use("write_file", write.clone()),
        MockResponse::text("Waiting for approval."),
        MockResponse::tool_use("write_file", write),
        MockResponse::text("Written."),
    ]);
    let agent = agent_with(&provider, &dir, vec![secret.to_string_lossy().into_owned()]);

    let events = agent.run_collect("s1", "save the plan", CancellationToken::new()).await;
    let (is_error, content) = first_result(&events);
    assert!(!is_error);
    assert_eq!(content["status"], "needs_approval");
    assert_eq!(content["operation"], "write");
    assert!(!target.exists(), "nothing may be written before approval");

    let pending = agent.pending_permissions("s1");
    assert_eq!(pending.len(), 1);
    assert_eq!(content["permission_id"], pending[0].id.as_str());

    agent.approve(&pending[0].id).unwrap();
    assert!(matches!(agent.approve(&pending[0].id), Err(GateError::NotFound(_))));

    let events = agent.run_collect("s1", "approved, go ahead", CancellationToken::new()).await;
    let (is_error, content) = first_result(&events);
    assert!(!is_error, "{}", content);
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "v1");
    assert!(agent.pending_permissions("s1").is_empty());
}

#[tokio::test]
async fn test_denied_prefix_blocks_later_attempts() {
    let dir = TempDir::new().unwrap();
    let secret = dir.path().join("vault");
    std::fs::create_dir_all(&secret).unwrap();
    std::fs::write(secret.join("a.txt"), "classified").unwrap();

    let read = json!({"path": secret.join("a.txt").to_string_lossy()});
    let provider = MockProvider::new().with_responses(vec![
        MockResponse::tool_use("read_file", read.clone()),
        MockResponse::text("Asked."),
        MockResponse::tool_use("read_file", read),
        MockResponse::text("Refused."),
    ]);
    let agent = agent_with(&provider, &dir, vec![secret.to_string_lossy().into_owned()]);

    agent.run_collect("s1", "read it", CancellationToken::new()).await;
    let pending = agent.pending_permissions("s1");
    agent.deny(&pending[0].id).unwrap();

    let events = agent.run_collect("s1", "try again", CancellationToken::new()).await;
    let (is_error, content) = first_result(&events);
    assert!(!is_error);
    assert_eq!(content["status"], "denied");
    assert!(agent.pending_permissions("s1").is_empty());
}

#[test]
fn test_documents_scenario_is_session_scoped() {
    let gate = CapabilityGate::new(Arc::new(SessionStore::new()), &[]);
    let path = "/home/u/Documents/x.txt";

    let pending_id = match gate.classify("s1", path, Operation::Write) {
        Classification::RequiresApproval { pending_id } => pending_id,
        other => panic!("expected approval request, got {:?}", other),
    };
    gate.approve(&pending_id).unwrap();

    assert_eq!(gate.classify("s1", path, Operation::Write), Classification::Allowed);
    assert!(matches!(
        gate.classify("s2", path, Operation::Write),
        Classification::RequiresApproval { .. }
    ));
}

#[test]
fn test_denied_path_never_allowed_after_unrelated_approval() {
    let gate = CapabilityGate::new(Arc::new(SessionStore::new()), &[]);

    let denied = match gate.classify("s1", "/etc/ssh", Operation::Read) {
        Classification::RequiresApproval { pending_id } => pending_id,
        other => panic!("unexpected {:?}", other),
    };
    gate.deny(&denied).unwrap();
    assert!(matches!(gate.deny(&denied), Err(GateError::NotFound(_))));

    let other = match gate.classify("s1", "/usr/share/doc", Operation::Read) {
        Classification::RequiresApproval { pending_id } => pending_id,
        other => panic!("unexpected {:?}", other),
    };
    gate.approve(&other).unwrap();

    for path in ["/etc/ssh", "/etc/ssh/sshd_config", "/ETC/SSH/../ssh/moduli", "/etc/sshd"] {
        assert!(
            matches!(gate.classify("s1", path, Operation::Read), Classification::Denied { .. }),
            "{} must stay denied",
            path
        );
    }
}

#[tokio::test]
async fn test_delete_tool_only_creates_pending_deletion() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("old.log");
    std::fs::write(&file, "0123456789").unwrap();

    let provider = MockProvider::new().with_responses(vec![
        MockResponse::tool_use(
            "delete_path",
            json!({"path": "old.log", "reason": "stale log"}),
        ),
        MockResponse::text("Please confirm."),
    ]);
    let agent = agent_with(&provider, &dir, Vec::new());

    let events = agent.run_collect("s1", "clean up", CancellationToken::new()).await;
    let (is_error, content) = first_result(&events);
    assert!(!is_error);
    assert_eq!(content["status"], "pending_confirmation");
    assert_eq!(content["size"], 10);
    assert!(file.exists());

    let pending = agent.pending_deletions("s1");
    assert_eq!(pending.len(), 1);
    assert_eq!(content["deletion_id"], pending[0].id.as_str());
    assert_eq!(pending[0].reason, "stale log");

    agent.confirm_deletion(&pending[0].id).await.unwrap();
    assert!(!file.exists());
    assert!(matches!(
        agent.confirm_deletion(&pending[0].id).await,
        Err(DeletionError::NotFound(_))
    ));
    assert!(matches!(
        agent.cancel_deletion(&pending[0].id),
        Err(DeletionError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_delete_of_missing_path_is_a_tool_error() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new().with_responses(vec![
        MockResponse::tool_use("delete_path", json!({"path": "nope", "reason": "x"})),
        MockResponse::text("ok"),
    ]);
    let agent = agent_with(&provider, &dir, Vec::new());

    let events = agent.run_collect("s1", "delete nope", CancellationToken::new()).await;
    let (is_error, content) = first_result(&events);
    assert!(is_error);
    assert!(content["error"].as_str().unwrap().contains("does not exist"));
    assert!(agent.pending_deletions("s1").is_empty());
}

#[tokio::test]
async fn test_clear_session_drops_pending_state() {
    let dir = TempDir::new().unwrap();
    let secret = dir.path().join("secret");
    let file = dir.path().join("f.txt");
    std::fs::write(&file, "x").unwrap();

    let provider = MockProvider::new().with_responses(vec![
        MockResponse::tool_uses(vec![
            ("read_file", json!({"path": secret.join("a").to_string_lossy()})),
            ("delete_path", json!({"path": "f.txt", "reason": "tidy"})),
        ]),
        MockResponse::text("ok"),
    ]);
    let agent = agent_with(&provider, &dir, vec![secret.to_string_lossy().into_owned()]);
    agent.run_collect("s1", "go", CancellationToken::new()).await;
    assert_eq!(agent.pending_permissions("s1").len(), 1);
    assert_eq!(agent.pending_deletions("s1").len(), 1);

    agent.clear_session("s1");
    assert!(agent.pending_permissions("s1").is_empty());
    assert!(agent.pending_deletions("s1").is_empty());
    assert!(file.exists());
}
