//! Provider registration from configuration.

use std::sync::Arc;

use anyhow::{Context, Result};
use tether_config::Config;
use tether_providers::{AnthropicProvider, LLMProvider, ProviderRegistry};
use tracing::debug;

/// Register every configured provider and set the default.
pub fn register_providers(config: &Config) -> Result<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();
    let (default_type, default_name) =
        Config::parse_provider_reference(&config.providers.default_provider)?;

    for (name, anthropic) in &config.providers.anthropic {
        // Providers without a key are only an error if they are the default
        if anthropic.api_key.trim().is_empty() && !(default_type == "anthropic" && *name == default_name) {
            debug!("Skipping anthropic.{}: no API key", name);
            continue;
        }
        let provider = AnthropicProvider::new_with_name(
            format!("anthropic.{}", name),
            anthropic.api_key.clone(),
            anthropic.model.clone(),
            anthropic.base_url.clone(),
            anthropic.max_tokens,
            anthropic.temperature,
        )?
        .with_thinking_budget(anthropic.thinking_budget_tokens);
        registry.register(provider);
    }

    debug!(
        "Setting default provider to: {}",
        config.providers.default_provider
    );
    registry.set_default(&config.providers.default_provider)?;
    Ok(registry)
}

/// The default provider, ready to hand to an [`Agent`](crate::Agent).
pub fn create_provider(config: &Config) -> Result<Arc<dyn LLMProvider>> {
    let mut registry = register_providers(config)?;
    let provider = registry
        .take(None)
        .context("Default provider is not registered")?;
    Ok(Arc::from(provider))
}
