//! HTTP fetch tool.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::dispatch::{ToolError, ToolHandler};

use super::ToolContext;

#[derive(Debug, Deserialize)]
pub struct WebFetchInput {
    pub url: String,
    #[serde(default)]
    pub max_bytes: Option<usize>,
}

pub struct WebFetch;

fn parse_url(raw: &str) -> Result<reqwest::Url, ToolError> {
    let url = reqwest::Url::parse(raw)
        .map_err(|e| ToolError::InvalidInput(format!("invalid url '{}': {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ToolError::InvalidInput(format!(
            "unsupported url scheme '{}'; only http and https are allowed",
            other
        ))),
    }
}

fn fetch_error(e: reqwest::Error) -> ToolError {
    if e.is_timeout() {
        ToolError::Failed(format!("request timed out: {}", e))
    } else {
        ToolError::Failed(format!("request failed: {}", e))
    }
}

#[async_trait]
impl ToolHandler for WebFetch {
    type Input = WebFetchInput;

    fn validate(&self, input: &WebFetchInput) -> Result<(), ToolError> {
        parse_url(&input.url).map(|_| ())
    }

    async fn run(&self, input: WebFetchInput, ctx: &ToolContext) -> Result<Value, ToolError> {
        let url = parse_url(&input.url)?;
        let max_bytes = input
            .max_bytes
            .unwrap_or(ctx.limits.max_output_bytes)
            .min(ctx.limits.max_output_bytes);
        debug!("Fetching {} (max {} bytes)", url, max_bytes);

        let mut response = ctx
            .http
            .get(url.clone())
            .timeout(Duration::from_secs(ctx.limits.fetch_timeout_secs))
            .send()
            .await
            .map_err(fetch_error)?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut body = Vec::new();
        let mut truncated = false;
        while let Some(chunk) = response.chunk().await.map_err(fetch_error)? {
            let room = max_bytes.saturating_sub(body.len());
            if chunk.len() > room {
                body.extend_from_slice(&chunk[..room]);
                truncated = true;
                break;
            }
            body.extend_from_slice(&chunk);
        }

        let text = String::from_utf8_lossy(&body).into_owned();
        if !status.is_success() {
            return Err(ToolError::Failed(format!(
                "HTTP {} from {}: {}",
                status.as_u16(),
                url,
                text.chars().take(500).collect::<String>()
            )));
        }

        Ok(json!({
            "url": url.as_str(),
            "status": status.as_u16(),
            "content_type": content_type,
            "content": text,
            "truncated": truncated,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_http_schemes_are_accepted() {
        assert!(parse_url("https://example.com/a").is_ok());
        assert!(parse_url("http://localhost:8080").is_ok());
        assert!(matches!(parse_url("file:///etc/passwd"), Err(ToolError::InvalidInput(_))));
        assert!(matches!(parse_url("not a url"), Err(ToolError::InvalidInput(_))));
    }
}
