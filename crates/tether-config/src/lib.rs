use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Locations searched when no explicit config path is given, in order.
const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "./tether.toml",
    "~/.config/tether/config.toml",
    "~/.tether.toml",
];

/// Environment variable used when a provider's `api_key` is left empty.
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
}

/// Provider configuration with named configs per provider type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Default provider in format "<provider_type>.<config_name>"
    pub default_provider: String,

    /// Named Anthropic provider configs
    #[serde(default)]
    pub anthropic: HashMap<String, AnthropicConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    #[serde(default)]
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub thinking_budget_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Upper bound on provider calls per run.
    pub max_turns: u32,
    /// Maximum number of messages kept in a session's history.
    pub history_window: usize,
    pub system_prompt: Option<String>,
    /// Base directory for relative tool paths; defaults to the process cwd.
    pub working_dir: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: 50,
            history_window: 80,
            system_prompt: None,
            working_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub shell_timeout_secs: u64,
    pub max_output_bytes: usize,
    pub fetch_timeout_secs: u64,
    pub max_search_results: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            shell_timeout_secs: 120,
            max_output_bytes: 100_000,
            fetch_timeout_secs: 30,
            max_search_results: 200,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Additional path prefixes that require approval before access.
    pub extra_sensitive_paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1".to_string(),
            port: 8765,
            request_timeout_secs: 30,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut anthropic_configs = HashMap::new();
        anthropic_configs.insert(
            "default".to_string(),
            AnthropicConfig {
                api_key: String::new(),
                model: "claude-sonnet-4-5".to_string(),
                base_url: None,
                max_tokens: Some(8192),
                temperature: Some(0.1),
                thinking_budget_tokens: None,
            },
        );

        Self {
            providers: ProvidersConfig {
                default_provider: "anthropic.default".to_string(),
                anthropic: anthropic_configs,
            },
            agent: AgentConfig::default(),
            tools: ToolsConfig::default(),
            sandbox: SandboxConfig::default(),
            bridge: BridgeConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, the default locations are
    /// searched; if none exists a default config is written to
    /// `~/.config/tether/config.toml` and returned.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = match config_path {
            Some(path) => {
                let expanded = shellexpand::tilde(path).to_string();
                if !Path::new(&expanded).exists() {
                    anyhow::bail!("Config file not found: {}", expanded);
                }
                expanded
            }
            None => match Self::find_default_config() {
                Some(path) => path,
                None => return Ok(Self::create_default_config()),
            },
        };

        debug!("Loading config from {}", path);
        Self::load_from_file(Path::new(&path))
    }

    /// Parse, fill secrets from the environment, and validate a config file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let config_content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config = toml::from_str(&config_content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn find_default_config() -> Option<String> {
        DEFAULT_CONFIG_PATHS.iter().find_map(|path| {
            let expanded_path = shellexpand::tilde(path);
            if Path::new(expanded_path.as_ref()).exists() {
                Some(expanded_path.to_string())
            } else {
                None
            }
        })
    }

    fn create_default_config() -> Self {
        let mut default_config = Self::default();
        default_config.apply_env_overrides();

        let config_dir = dirs::home_dir()
            .map(|mut path| {
                path.push(".config");
                path.push("tether");
                path
            })
            .unwrap_or_else(|| PathBuf::from("."));

        if let Err(e) = std::fs::create_dir_all(&config_dir) {
            warn!("Could not create config directory {}: {}", config_dir.display(), e);
        }

        let config_file = config_dir.join("config.toml");
        // Persist the template without any key picked up from the environment
        match Self::default().save(&config_file) {
            Ok(()) => info!("Created default configuration at {}", config_file.display()),
            Err(e) => warn!("Could not save default config: {}", e),
        }

        default_config
    }

    /// Fill empty Anthropic API keys from `ANTHROPIC_API_KEY`.
    pub fn apply_env_overrides(&mut self) {
        let Ok(key) = std::env::var(ANTHROPIC_API_KEY_ENV) else {
            return;
        };
        if key.trim().is_empty() {
            return;
        }
        for (name, anthropic) in self.providers.anthropic.iter_mut() {
            if anthropic.api_key.trim().is_empty() {
                debug!("Using {} for anthropic.{}", ANTHROPIC_API_KEY_ENV, name);
                anthropic.api_key = key.clone();
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.validate_provider_reference(&self.providers.default_provider)?;
        if self.agent.max_turns == 0 {
            anyhow::bail!("agent.max_turns must be at least 1");
        }
        if self.agent.history_window < 2 {
            anyhow::bail!("agent.history_window must be at least 2");
        }
        if self.bridge.request_timeout_secs == 0 {
            anyhow::bail!("bridge.request_timeout_secs must be at least 1");
        }
        Ok(())
    }

    /// Validate a provider reference (format: "<provider_type>.<config_name>")
    fn validate_provider_reference(&self, reference: &str) -> Result<()> {
        let (provider_type, config_name) = Self::parse_provider_reference(reference)?;

        match provider_type.as_str() {
            "anthropic" => {
                if !self.providers.anthropic.contains_key(&config_name) {
                    anyhow::bail!(
                        "Provider config 'anthropic.{}' not found. Available: {:?}",
                        config_name,
                        self.providers.anthropic.keys().collect::<Vec<_>>()
                    );
                }
            }
            _ => {
                anyhow::bail!(
                    "Unknown provider type '{}'. Valid types: anthropic",
                    provider_type
                );
            }
        }

        Ok(())
    }

    /// Parse a provider reference into (provider_type, config_name)
    pub fn parse_provider_reference(reference: &str) -> Result<(String, String)> {
        match reference.split_once('.') {
            Some((provider_type, config_name))
                if !provider_type.is_empty()
                    && !config_name.is_empty()
                    && !config_name.contains('.') =>
            {
                Ok((provider_type.to_string(), config_name.to_string()))
            }
            _ => anyhow::bail!(
                "Invalid provider reference '{}'. Expected format: '<provider_type>.<config_name>'",
                reference
            ),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;
        Ok(())
    }

    pub fn load_with_overrides(
        config_path: Option<&str>,
        provider_override: Option<String>,
        model_override: Option<String>,
    ) -> Result<Self> {
        let mut config = Self::load(config_path)?;

        if let Some(provider) = provider_override {
            config.validate_provider_reference(&provider)?;
            config.providers.default_provider = provider;
        }

        // Apply model override to the active provider
        if let Some(model) = model_override {
            let (_, config_name) =
                Self::parse_provider_reference(&config.providers.default_provider)?;
            match config.providers.anthropic.get_mut(&config_name) {
                Some(anthropic_config) => anthropic_config.model = model,
                None => anyhow::bail!("Provider config 'anthropic.{}' not found.", config_name),
            }
        }

        Ok(config)
    }

    /// Get Anthropic config by name
    pub fn get_anthropic_config(&self, name: &str) -> Option<&AnthropicConfig> {
        self.providers.anthropic.get(name)
    }

    /// Get the current default provider's config
    pub fn get_default_provider_config(&self) -> Result<ProviderConfigRef<'_>> {
        let (provider_type, config_name) =
            Self::parse_provider_reference(&self.providers.default_provider)?;

        match provider_type.as_str() {
            "anthropic" => self
                .providers
                .anthropic
                .get(&config_name)
                .map(|config| ProviderConfigRef::Anthropic {
                    name: self.providers.default_provider.clone(),
                    config,
                })
                .ok_or_else(|| anyhow::anyhow!("Anthropic config '{}' not found", config_name)),
            other => Err(anyhow::anyhow!("Unknown provider type '{}'", other)),
        }
    }
}

/// Reference to a provider configuration
#[derive(Debug)]
pub enum ProviderConfigRef<'a> {
    Anthropic {
        /// Full "<type>.<name>" reference.
        name: String,
        config: &'a AnthropicConfig,
    },
}

#[cfg(test)]
mod tests;
