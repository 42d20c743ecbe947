//! Browser tools. Each one forwards a single command over the bridge.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::dispatch::{ToolError, ToolHandler};

use super::ToolContext;

fn non_empty(value: &str, field: &str) -> Result<(), ToolError> {
    if value.trim().is_empty() {
        return Err(ToolError::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct NavigateInput {
    pub url: String,
}

pub struct Navigate;

#[async_trait]
impl ToolHandler for Navigate {
    type Input = NavigateInput;

    fn validate(&self, input: &NavigateInput) -> Result<(), ToolError> {
        non_empty(&input.url, "url")
    }

    async fn run(&self, input: NavigateInput, ctx: &ToolContext) -> Result<Value, ToolError> {
        Ok(ctx.browser()?.navigate(&input.url).await?)
    }
}

#[derive(Debug, Deserialize)]
pub struct SelectorInput {
    pub selector: String,
}

pub struct Click;

#[async_trait]
impl ToolHandler for Click {
    type Input = SelectorInput;

    fn validate(&self, input: &SelectorInput) -> Result<(), ToolError> {
        non_empty(&input.selector, "selector")
    }

    async fn run(&self, input: SelectorInput, ctx: &ToolContext) -> Result<Value, ToolError> {
        Ok(ctx.browser()?.click(&input.selector).await?)
    }
}

#[derive(Debug, Deserialize)]
pub struct TypeTextInput {
    pub selector: String,
    pub text: String,
    #[serde(default)]
    pub submit: bool,
}

pub struct TypeText;

#[async_trait]
impl ToolHandler for TypeText {
    type Input = TypeTextInput;

    fn validate(&self, input: &TypeTextInput) -> Result<(), ToolError> {
        non_empty(&input.selector, "selector")
    }

    async fn run(&self, input: TypeTextInput, ctx: &ToolContext) -> Result<Value, ToolError> {
        Ok(ctx
            .browser()?
            .type_text(&input.selector, &input.text, input.submit)
            .await?)
    }
}

#[derive(Debug, Deserialize)]
pub struct ReadPageInput {
    #[serde(default)]
    pub selector: Option<String>,
}

pub struct ReadPage;

#[async_trait]
impl ToolHandler for ReadPage {
    type Input = ReadPageInput;

    async fn run(&self, input: ReadPageInput, ctx: &ToolContext) -> Result<Value, ToolError> {
        let page = ctx.browser()?.read_page(input.selector.as_deref()).await?;
        Ok(match page {
            Value::String(text) => Value::String(ctx.truncate(&text).0),
            other => other,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct EmptyInput {}

pub struct Screenshot;

#[async_trait]
impl ToolHandler for Screenshot {
    type Input = EmptyInput;

    async fn run(&self, _input: EmptyInput, ctx: &ToolContext) -> Result<Value, ToolError> {
        Ok(ctx.browser()?.screenshot().await?)
    }
}

#[derive(Debug, Deserialize)]
pub struct EvaluateInput {
    pub script: String,
}

pub struct Evaluate;

#[async_trait]
impl ToolHandler for Evaluate {
    type Input = EvaluateInput;

    fn validate(&self, input: &EvaluateInput) -> Result<(), ToolError> {
        non_empty(&input.script, "script")
    }

    async fn run(&self, input: EvaluateInput, ctx: &ToolContext) -> Result<Value, ToolError> {
        Ok(ctx.browser()?.evaluate(&input.script).await?)
    }
}
