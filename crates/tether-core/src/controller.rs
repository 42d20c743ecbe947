//! The turn loop.
//!
//! Each turn sends the history to the provider, decodes the streamed reply
//! and, if the model asked for tools, runs them one at a time in the order
//! they were emitted. The assistant message and a single user message
//! carrying every tool result are then appended, so each tool_use is paired
//! with its tool_result before the next provider call. The loop ends when the
//! model stops asking for tools, when the turn cap is hit, or on a provider
//! failure or cancellation.

use std::sync::Arc;

use anyhow::anyhow;
use tether_providers::{
    CompletionRequest, LLMProvider, Message, MessageRole, ProviderError, Tool, ToolCall,
};
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::decoder::{DecodedFragment, EventStreamDecoder};
use crate::dispatch::ToolDispatcher;
use crate::error_handling::{user_message, ErrorContext};
use crate::events::{AgentEvent, EventSink};
use crate::history::ConversationHistory;
use crate::tools::ToolContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Running,
    AwaitingTools,
    Stopped,
    Aborted,
}

#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub max_turns: u32,
    pub history_window: usize,
    pub system_prompt: String,
    pub tools: Vec<Tool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// `Stopped` or `Aborted`.
    pub state: TurnState,
    pub turns: u32,
    pub stop_reason: Option<String>,
}

/// Why a turn could not complete.
enum TurnFailure {
    Cancelled,
    Provider(anyhow::Error),
}

pub struct TurnController {
    provider: Arc<dyn LLMProvider>,
    dispatcher: ToolDispatcher,
    settings: TurnSettings,
}

impl TurnController {
    pub fn new(provider: Arc<dyn LLMProvider>, settings: TurnSettings) -> Self {
        Self {
            provider,
            dispatcher: ToolDispatcher::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &TurnSettings {
        &self.settings
    }

    /// Drive turns until the model is done, the turn cap is reached, or the
    /// run aborts. Always emits exactly one terminal event.
    pub async fn run(
        &self,
        history: &mut ConversationHistory,
        ctx: &ToolContext,
        sink: &dyn EventSink,
    ) -> RunOutcome {
        sink.emit(AgentEvent::SessionInit {
            session_id: ctx.session_id.clone(),
            provider: self.provider.name().to_string(),
            model: self.provider.model().to_string(),
        });

        let max_turns = self.settings.max_turns.max(1);
        let mut turns = 0;
        let mut state = TurnState::Running;

        loop {
            debug!("Session {} state {:?}", ctx.session_id, state);
            turns += 1;

            let calls = match self.run_turn(history, ctx, sink).await {
                Ok((calls, stop_reason)) if calls.is_empty() => {
                    info!(
                        "Session {} finished after {} turn(s) ({:?})",
                        ctx.session_id, turns, stop_reason
                    );
                    sink.emit(AgentEvent::Done {
                        stop_reason: stop_reason.clone(),
                        turns,
                        notice: None,
                    });
                    return RunOutcome {
                        state: TurnState::Stopped,
                        turns,
                        stop_reason,
                    };
                }
                Ok((calls, _)) => calls,
                Err(failure) => return self.abort(failure, history, ctx, sink, turns),
            };

            state = TurnState::AwaitingTools;
            debug!("Session {} state {:?}", ctx.session_id, state);
            self.execute_tools(&calls, history, ctx, sink).await;

            if ctx.cancel.is_cancelled() {
                return self.abort(TurnFailure::Cancelled, history, ctx, sink, turns);
            }

            if turns >= max_turns {
                let notice = format!("Maximum number of turns ({}) reached", max_turns);
                warn!("Session {}: {}", ctx.session_id, notice);
                sink.emit(AgentEvent::Done {
                    stop_reason: Some("max_turns".to_string()),
                    turns,
                    notice: Some(notice),
                });
                return RunOutcome {
                    state: TurnState::Stopped,
                    turns,
                    stop_reason: Some("max_turns".to_string()),
                };
            }
            state = TurnState::Running;
        }
    }

    /// One provider call. Returns the tool calls to run (empty when the model
    /// is done) and the stop reason. The assistant reply is appended to
    /// history only if the stream completed.
    async fn run_turn(
        &self,
        history: &mut ConversationHistory,
        ctx: &ToolContext,
        sink: &dyn EventSink,
    ) -> Result<(Vec<ToolCall>, Option<String>), TurnFailure> {
        if ctx.cancel.is_cancelled() {
            return Err(TurnFailure::Cancelled);
        }
        let dropped = history.trim(self.settings.history_window);
        if dropped > 0 {
            debug!("Dropped {} old messages before provider call", dropped);
        }

        let request = CompletionRequest {
            system: Some(self.settings.system_prompt.clone()),
            messages: history.messages().to_vec(),
            max_tokens: None,
            temperature: None,
            tools: Some(self.settings.tools.clone()),
        };

        let mut stream = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(TurnFailure::Cancelled),
            result = self.provider.stream(request) => result.map_err(TurnFailure::Provider)?,
        };

        let mut decoder = EventStreamDecoder::new();
        loop {
            let item = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return Err(TurnFailure::Cancelled),
                item = stream.next() => item,
            };
            match item {
                Some(Ok(event)) => {
                    if let Some(fragment) = decoder.apply(&event) {
                        emit_fragment(sink, fragment);
                    }
                }
                Some(Err(e)) => return Err(TurnFailure::Provider(e)),
                None => break,
            }
        }

        let (turn, late_calls) = decoder.finish();
        if !turn.complete {
            return Err(TurnFailure::Provider(
                ProviderError::Interrupted("stream ended before message_stop".to_string()).into(),
            ));
        }
        for call in late_calls {
            emit_fragment(sink, DecodedFragment::ToolCall(call));
        }
        debug!(
            "Turn decoded: {} text chunk(s), {} tool call(s), stop {:?}",
            turn.text_chunks.len(),
            turn.tool_calls.len(),
            turn.stop_reason
        );

        // A reply made only of thinking is not worth a history entry
        if turn.content.iter().any(|block| !block.is_thinking()) {
            history.push(Message::assistant_blocks(turn.content.clone()));
        }
        Ok((turn.tool_calls, turn.stop_reason))
    }

    async fn execute_tools(
        &self,
        calls: &[ToolCall],
        history: &mut ConversationHistory,
        ctx: &ToolContext,
        sink: &dyn EventSink,
    ) {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let outcome = self.dispatcher.execute(ctx, call).await;
            sink.emit(AgentEvent::ToolResult {
                tool_use_id: outcome.tool_use_id.clone(),
                name: outcome.name.clone(),
                is_error: outcome.is_error,
                content: outcome.content.clone(),
            });
            results.push(outcome.to_content_block());
        }
        history.push(Message::user_blocks(results));
    }

    fn abort(
        &self,
        failure: TurnFailure,
        history: &ConversationHistory,
        ctx: &ToolContext,
        sink: &dyn EventSink,
        turns: u32,
    ) -> RunOutcome {
        let (err, message) = match failure {
            TurnFailure::Cancelled => {
                info!("Session {} run cancelled", ctx.session_id);
                (anyhow!("run cancelled"), "Run cancelled".to_string())
            }
            TurnFailure::Provider(err) => {
                let message = user_message(&err);
                (err, message)
            }
        };

        let last_prompt = history
            .messages()
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User && !m.has_tool_results())
            .map(Message::text)
            .unwrap_or_default();
        ErrorContext::new(
            "turn",
            self.provider.name(),
            self.provider.model(),
            &ctx.session_id,
            turns,
            &last_prompt,
        )
        .log_error(&err);

        sink.emit(AgentEvent::Error { message });
        RunOutcome {
            state: TurnState::Aborted,
            turns,
            stop_reason: None,
        }
    }
}

fn emit_fragment(sink: &dyn EventSink, fragment: DecodedFragment) {
    let event = match fragment {
        DecodedFragment::Text(text) => AgentEvent::Text { text },
        DecodedFragment::Thinking(thinking) => AgentEvent::Thinking { thinking },
        DecodedFragment::ToolCall(call) => AgentEvent::ToolUse {
            id: call.id,
            name: call.name,
            input: call.input,
        },
    };
    sink.emit(event);
}
