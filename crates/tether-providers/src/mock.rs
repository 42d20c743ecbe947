//! Mock LLM Provider for Testing
//!
//! A scripted provider: each queued [`MockResponse`] is a list of stream
//! events replayed in order on the next `stream` call. Responses can also
//! fail the call outright or break the stream part way through, which lets
//! tests drive every error path of the turn loop without a network.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use tether_providers::{MockProvider, MockResponse};
//!
//! let provider = MockProvider::new().with_responses(vec![
//!     MockResponse::tool_use("read_file", json!({"path": "notes.txt"})),
//!     MockResponse::text("The file says hello."),
//! ]);
//! assert_eq!(provider.request_count(), 0);
//! ```

use crate::{CompletionRequest, CompletionStream, LLMProvider, ProviderError, StreamEvent};
use anyhow::Result;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Global counter for generating unique tool call IDs
static TOOL_CALL_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_tool_id() -> String {
    format!(
        "toolu_mock_{}",
        TOOL_CALL_COUNTER.fetch_add(1, Ordering::SeqCst)
    )
}

/// One scripted provider reply.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub events: Vec<StreamEvent>,
    /// Make `stream()` itself return this error.
    pub fail_call: Option<String>,
    /// Emit this error after the events, then end the stream.
    pub break_with: Option<String>,
}

impl MockResponse {
    /// Raw event script.
    pub fn events(events: Vec<StreamEvent>) -> Self {
        Self {
            events,
            fail_call: None,
            break_with: None,
        }
    }

    /// A text-only reply ending with `end_turn`.
    pub fn text(content: &str) -> Self {
        Self::streaming(vec![content])
    }

    /// A text reply delivered over several deltas.
    pub fn streaming(chunks: Vec<&str>) -> Self {
        let mut events = vec![StreamEvent::text_start(0)];
        events.extend(chunks.into_iter().map(|c| StreamEvent::text_delta(0, c)));
        events.push(StreamEvent::block_stop(0));
        events.push(StreamEvent::stop("end_turn"));
        events.push(StreamEvent::MessageStop);
        Self::events(events)
    }

    /// A single tool call with an auto-generated id.
    pub fn tool_use(tool: &str, input: serde_json::Value) -> Self {
        Self::tool_uses(vec![(tool, input)])
    }

    /// Several tool calls in one reply, in order.
    pub fn tool_uses(calls: Vec<(&str, serde_json::Value)>) -> Self {
        let mut events = Vec::new();
        push_tool_blocks(&mut events, 0, calls);
        events.push(StreamEvent::stop("tool_use"));
        events.push(StreamEvent::MessageStop);
        Self::events(events)
    }

    /// Text followed by a tool call.
    pub fn text_then_tool(text: &str, tool: &str, input: serde_json::Value) -> Self {
        let mut events = vec![
            StreamEvent::text_start(0),
            StreamEvent::text_delta(0, text),
            StreamEvent::block_stop(0),
        ];
        push_tool_blocks(&mut events, 1, vec![(tool, input)]);
        events.push(StreamEvent::stop("tool_use"));
        events.push(StreamEvent::MessageStop);
        Self::events(events)
    }

    /// A reply cut off by `max_tokens`.
    pub fn truncated(content: &str) -> Self {
        Self::events(vec![
            StreamEvent::text_start(0),
            StreamEvent::text_delta(0, content),
            StreamEvent::block_stop(0),
            StreamEvent::stop("max_tokens"),
            StreamEvent::MessageStop,
        ])
    }

    /// `stream()` fails before any event is produced.
    pub fn failure(message: &str) -> Self {
        Self {
            events: Vec::new(),
            fail_call: Some(message.to_string()),
            break_with: None,
        }
    }

    /// The given events are delivered, then the stream fails.
    pub fn broken(events: Vec<StreamEvent>, message: &str) -> Self {
        Self {
            events,
            fail_call: None,
            break_with: Some(message.to_string()),
        }
    }
}

fn push_tool_blocks(
    events: &mut Vec<StreamEvent>,
    first_index: usize,
    calls: Vec<(&str, serde_json::Value)>,
) {
    for (offset, (tool, input)) in calls.into_iter().enumerate() {
        let index = first_index + offset;
        let json = input.to_string();
        // Split the arguments to exercise incremental reassembly
        let mid = json
            .char_indices()
            .nth(json.chars().count() / 2)
            .map_or(json.len(), |(i, _)| i);
        events.push(StreamEvent::tool_use_start(index, &next_tool_id(), tool));
        events.push(StreamEvent::input_json_delta(index, &json[..mid]));
        events.push(StreamEvent::input_json_delta(index, &json[mid..]));
        events.push(StreamEvent::block_stop(index));
    }
}

/// A mock LLM provider for testing
///
/// Responses are returned in FIFO order; every request is recorded so tests
/// can inspect exactly what history the caller sent.
#[derive(Clone)]
pub struct MockProvider {
    name: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
    default_response: Option<MockResponse>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            model: "mock-model".to_string(),
            max_tokens: 4096,
            temperature: 0.7,
            responses: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            default_response: None,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_response(self, response: MockResponse) -> Self {
        lock(&self.responses).push_back(response);
        self
    }

    pub fn with_responses(self, responses: Vec<MockResponse>) -> Self {
        lock(&self.responses).extend(responses);
        self
    }

    /// Response used once the queue is exhausted.
    pub fn with_default_response(mut self, response: MockResponse) -> Self {
        self.default_response = Some(response);
        self
    }

    /// Queue another response on a provider that is already shared.
    pub fn push_response(&self, response: MockResponse) {
        lock(&self.responses).push_back(response);
    }

    pub fn get_requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    fn next_response(&self) -> MockResponse {
        lock(&self.responses).pop_front().unwrap_or_else(|| {
            self.default_response
                .clone()
                .unwrap_or_else(|| MockResponse::text("Mock response (no responses configured)"))
        })
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LLMProvider for MockProvider {
    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream> {
        lock(&self.requests).push(request);

        let response = self.next_response();
        if let Some(message) = response.fail_call {
            return Err(ProviderError::Status {
                status: 500,
                body: message,
            }
            .into());
        }

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            for event in response.events {
                if tx.send(Ok(event)).await.is_err() {
                    return;
                }
            }
            if let Some(message) = response.break_with {
                let _ = tx
                    .send(Err(ProviderError::Interrupted(message).into()))
                    .await;
            }
        });

        Ok(ReceiverStream::new(rx))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    fn temperature(&self) -> f32 {
        self.temperature
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BlockDelta, Message};
    use serde_json::json;
    use tokio_stream::StreamExt;

    fn request() -> CompletionRequest {
        CompletionRequest {
            system: None,
            messages: vec![Message::user("hi")],
            max_tokens: None,
            temperature: None,
            tools: None,
        }
    }

    async fn collect(provider: &MockProvider) -> Vec<Result<StreamEvent>> {
        provider.stream(request()).await.unwrap().collect().await
    }

    #[tokio::test]
    async fn test_text_response_replays_events() {
        let provider = MockProvider::new().with_response(MockResponse::streaming(vec!["a", "b"]));
        let events: Vec<StreamEvent> = collect(&provider)
            .await
            .into_iter()
            .map(|e| e.unwrap())
            .collect();
        assert_eq!(events[1], StreamEvent::text_delta(0, "a"));
        assert_eq!(events[2], StreamEvent::text_delta(0, "b"));
        assert_eq!(events.last(), Some(&StreamEvent::MessageStop));
        assert_eq!(provider.request_count(), 1);
    }

    #[tokio::test]
    async fn test_tool_arguments_are_split_across_deltas() {
        let provider = MockProvider::new()
            .with_response(MockResponse::tool_use("read_file", json!({"path": "a.txt"})));
        let joined: String = collect(&provider)
            .await
            .into_iter()
            .filter_map(|e| match e.unwrap() {
                StreamEvent::ContentBlockDelta {
                    delta: BlockDelta::InputJsonDelta { partial_json },
                    ..
                } => Some(partial_json),
                _ => None,
            })
            .collect();
        assert_eq!(joined, r#"{"path":"a.txt"}"#);
    }

    #[tokio::test]
    async fn test_failure_and_broken_stream() {
        let provider = MockProvider::new().with_responses(vec![
            MockResponse::failure("boom"),
            MockResponse::broken(vec![StreamEvent::text_start(0)], "reset"),
        ]);
        assert!(provider.stream(request()).await.is_err());

        let items = collect(&provider).await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].as_ref().unwrap_err().to_string().contains("reset"));
    }

    #[tokio::test]
    async fn test_default_response_after_queue_drains() {
        let provider = MockProvider::new().with_default_response(MockResponse::text("fallback"));
        let items = collect(&provider).await;
        assert_eq!(
            items[1].as_ref().unwrap(),
            &StreamEvent::text_delta(0, "fallback")
        );
    }
}
