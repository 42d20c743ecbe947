//! Anthropic Messages API provider.
//!
//! Streams `text/event-stream` responses and forwards each decoded event to the
//! caller unchanged; reconstruction of text and tool calls happens in the
//! consumer. Extended thinking is requested when a thinking budget is set.
//!
//! # Usage
//!
//! ```rust,no_run
//! use tether_providers::{AnthropicProvider, CompletionRequest, LLMProvider, Message};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let provider = AnthropicProvider::new(
//!         "your-api-key".to_string(),
//!         "claude-sonnet-4-5".to_string(),
//!         None,
//!         Some(4096),
//!         None,
//!     )?;
//!
//!     let request = CompletionRequest {
//!         system: None,
//!         messages: vec![Message::user("Hello!")],
//!         max_tokens: None,
//!         temperature: None,
//!         tools: None,
//!     };
//!
//!     let _stream = provider.stream(request).await?;
//!     Ok(())
//! }
//! ```

use anyhow::{anyhow, Result};
use bytes::Bytes;
use futures_util::stream::StreamExt;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, warn};

use crate::streaming::{parse_sse_data, SseLineDecoder};
use crate::{
    CompletionRequest, CompletionStream, LLMProvider, Message, ProviderError, StreamEvent, Tool,
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 8192;
const DEFAULT_TEMPERATURE: f32 = 0.1;

#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    client: Client,
    name: String,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
    temperature: f32,
    thinking_budget_tokens: Option<u32>,
}

impl AnthropicProvider {
    pub fn new(
        api_key: String,
        model: String,
        base_url: Option<String>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<Self> {
        Self::new_with_name(
            "anthropic".to_string(),
            api_key,
            model,
            base_url,
            max_tokens,
            temperature,
        )
    }

    pub fn new_with_name(
        name: String,
        api_key: String,
        model: String,
        base_url: Option<String>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(anyhow!(
                "Anthropic provider '{}' has no API key (set api_key or ANTHROPIC_API_KEY)",
                name
            ));
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            name,
            api_key,
            model,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            max_tokens: max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: temperature.unwrap_or(DEFAULT_TEMPERATURE),
            thinking_budget_tokens: None,
        })
    }

    /// Enable extended thinking with the given token budget.
    pub fn with_thinking_budget(mut self, budget_tokens: Option<u32>) -> Self {
        self.thinking_budget_tokens = budget_tokens;
        self
    }

    fn create_request_body<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> AnthropicRequest<'a> {
        let mut max_tokens = request.max_tokens.unwrap_or(self.max_tokens);

        // Thinking requires max_tokens > budget and a temperature of 1.0
        let thinking = self.thinking_budget_tokens.map(|budget| {
            if max_tokens <= budget {
                warn!(
                    "max_tokens ({}) must exceed thinking budget ({}); raising it",
                    max_tokens, budget
                );
                max_tokens = budget + 1024;
            }
            ThinkingConfig {
                r#type: "enabled",
                budget_tokens: budget,
            }
        });
        let temperature = if thinking.is_some() {
            None
        } else {
            Some(request.temperature.unwrap_or(self.temperature))
        };

        AnthropicRequest {
            model: &self.model,
            max_tokens,
            system: request.system.as_deref(),
            messages: &request.messages,
            tools: request.tools.as_deref().filter(|t| !t.is_empty()),
            temperature,
            thinking,
            stream: true,
        }
    }

    async fn parse_streaming_response(
        mut stream: impl futures_util::Stream<Item = reqwest::Result<Bytes>> + Unpin,
        tx: mpsc::Sender<Result<StreamEvent>>,
    ) {
        let mut decoder = SseLineDecoder::new();
        let mut chunk_count = 0usize;

        while let Some(chunk_result) = stream.next().await {
            let chunk = match chunk_result {
                Ok(c) => c,
                Err(e) => {
                    error!("Stream error at chunk {}: {}", chunk_count, e);
                    let _ = tx
                        .send(Err(ProviderError::Interrupted(e.to_string()).into()))
                        .await;
                    return;
                }
            };
            chunk_count += 1;

            for data in decoder.push(&chunk) {
                if !Self::forward(&data, &tx).await {
                    return;
                }
            }
        }

        if let Some(data) = decoder.finish() {
            Self::forward(&data, &tx).await;
        }
        debug!("Stream ended after {} chunks", chunk_count);
    }

    /// Forward one payload; returns false when the consumer is gone or the
    /// provider reported an error.
    async fn forward(data: &str, tx: &mpsc::Sender<Result<StreamEvent>>) -> bool {
        let Some(event) = parse_sse_data(data) else {
            return true;
        };
        if let StreamEvent::Error { error } = &event {
            error!("Provider reported error: {} {}", error.kind, error.message);
            let _ = tx
                .send(Err(ProviderError::Api {
                    kind: error.kind.clone(),
                    message: error.message.clone(),
                }
                .into()))
                .await;
            return false;
        }
        if tx.send(Ok(event)).await.is_err() {
            debug!("Receiver dropped");
            return false;
        }
        true
    }
}

#[async_trait::async_trait]
impl LLMProvider for AnthropicProvider {
    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream> {
        debug!(
            "Processing Anthropic streaming request with {} messages",
            request.messages.len()
        );
        if request.messages.is_empty() {
            return Err(anyhow!("At least one message is required"));
        }

        let body = self.create_request_body(&request);
        debug!(
            "Sending streaming request: model={}, max_tokens={}, tools={}",
            self.model,
            body.max_tokens,
            body.tools.map_or(0, |t| t.len())
        );

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .header("accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to send streaming request to Anthropic API: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let stream = response.bytes_stream();
        let (tx, rx) = mpsc::channel(100);
        tokio::spawn(Self::parse_streaming_response(stream, tx));

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

// Anthropic API request structures

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [Tool]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<ThinkingConfig>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ThinkingConfig {
    r#type: &'static str,
    budget_tokens: u32,
}
