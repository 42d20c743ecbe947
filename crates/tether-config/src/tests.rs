#[cfg(test)]
mod tests {
    use crate::{Config, ProviderConfigRef, ANTHROPIC_API_KEY_ENV};
    use serial_test::serial;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_config(temp_dir: &TempDir, content: &str) -> PathBuf {
        let config_path = temp_dir.path().join("test_config.toml");
        fs::write(&config_path, content).unwrap();
        config_path
    }

    const MINIMAL: &str = r#"
[providers]
default_provider = "anthropic.default"

[providers.anthropic.default]
api_key = "test-key"
model = "claude-test"
"#;

    #[test]
    #[serial]
    fn test_minimal_config_gets_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, MINIMAL);

        let config = Config::load(Some(path.to_str().unwrap())).unwrap();

        assert_eq!(config.agent.max_turns, 50);
        assert_eq!(config.agent.history_window, 80);
        assert_eq!(config.tools.shell_timeout_secs, 120);
        assert_eq!(config.tools.max_output_bytes, 100_000);
        assert_eq!(config.tools.fetch_timeout_secs, 30);
        assert_eq!(config.tools.max_search_results, 200);
        assert!(config.sandbox.extra_sensitive_paths.is_empty());
        assert!(config.bridge.enabled);
        assert_eq!(config.bridge.bind_address, "127.0.0.1");
        assert_eq!(config.bridge.port, 8765);
        assert_eq!(config.bridge.request_timeout_secs, 30);
    }

    #[test]
    #[serial]
    fn test_full_config_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(
            &temp_dir,
            r#"
[providers]
default_provider = "anthropic.fast"

[providers.anthropic.fast]
api_key = "k"
model = "claude-haiku"
base_url = "http://localhost:9999"
max_tokens = 1024
thinking_budget_tokens = 2048

[agent]
max_turns = 5
history_window = 10
system_prompt = "Be careful."

[tools]
shell_timeout_secs = 3

[sandbox]
extra_sensitive_paths = ["/srv/data"]

[bridge]
enabled = false
port = 9000
"#,
        );

        let config = Config::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.agent.max_turns, 5);
        assert_eq!(config.agent.system_prompt.as_deref(), Some("Be careful."));
        assert_eq!(config.tools.shell_timeout_secs, 3);
        assert_eq!(config.tools.max_output_bytes, 100_000);
        assert_eq!(config.sandbox.extra_sensitive_paths, vec!["/srv/data"]);
        assert!(!config.bridge.enabled);
        assert_eq!(config.bridge.port, 9000);

        match config.get_default_provider_config().unwrap() {
            ProviderConfigRef::Anthropic { name, config } => {
                assert_eq!(name, "anthropic.fast");
                assert_eq!(config.base_url.as_deref(), Some("http://localhost:9999"));
                assert_eq!(config.thinking_budget_tokens, Some(2048));
            }
        }

        let saved = temp_dir.path().join("saved.toml");
        config.save(&saved).unwrap();
        let reloaded = Config::load_from_file(&saved).unwrap();
        assert_eq!(reloaded.providers.default_provider, "anthropic.fast");
        assert_eq!(reloaded.bridge.port, 9000);
    }

    #[test]
    #[serial]
    fn test_invalid_provider_reference() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(
            &temp_dir,
            r#"
[providers]
default_provider = "anthropic.missing"

[providers.anthropic.default]
api_key = "k"
model = "m"
"#,
        );

        let err = Config::load(Some(path.to_str().unwrap()))
            .unwrap_err()
            .to_string();
        assert!(err.contains("not found"), "unexpected error: {}", err);

        assert!(Config::parse_provider_reference("anthropic").is_err());
        assert!(Config::parse_provider_reference("a.b.c").is_err());
        assert_eq!(
            Config::parse_provider_reference("anthropic.default").unwrap(),
            ("anthropic".to_string(), "default".to_string())
        );
    }

    #[test]
    #[serial]
    fn test_unknown_provider_type_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(
            &temp_dir,
            r#"
[providers]
default_provider = "openai.default"
"#,
        );
        let err = Config::load(Some(path.to_str().unwrap()))
            .unwrap_err()
            .to_string();
        assert!(err.contains("Unknown provider type"), "unexpected error: {}", err);
    }

    #[test]
    #[serial]
    fn test_zero_max_turns_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let content = format!("{}\n[agent]\nmax_turns = 0\n", MINIMAL);
        let path = write_config(&temp_dir, &content);
        assert!(Config::load(Some(path.to_str().unwrap())).is_err());
    }

    #[test]
    #[serial]
    fn test_missing_explicit_path_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nope.toml");
        assert!(Config::load(Some(path.to_str().unwrap())).is_err());
    }

    #[test]
    #[serial]
    fn test_empty_api_key_filled_from_env() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(
            &temp_dir,
            r#"
[providers]
default_provider = "anthropic.default"

[providers.anthropic.default]
model = "claude-test"

[providers.anthropic.explicit]
api_key = "keep-me"
model = "claude-test"
"#,
        );

        std::env::set_var(ANTHROPIC_API_KEY_ENV, "from-env");
        let config = Config::load(Some(path.to_str().unwrap()));
        std::env::remove_var(ANTHROPIC_API_KEY_ENV);
        let config = config.unwrap();

        assert_eq!(config.get_anthropic_config("default").unwrap().api_key, "from-env");
        assert_eq!(config.get_anthropic_config("explicit").unwrap().api_key, "keep-me");
    }

    #[test]
    #[serial]
    fn test_overrides() {
        let temp_dir = TempDir::new().unwrap();
        let content = format!(
            "{}\n[providers.anthropic.other]\napi_key = \"k2\"\nmodel = \"claude-other\"\n",
            MINIMAL
        );
        let path = write_config(&temp_dir, &content);

        let config = Config::load_with_overrides(
            Some(path.to_str().unwrap()),
            Some("anthropic.other".to_string()),
            Some("claude-override".to_string()),
        )
        .unwrap();

        assert_eq!(config.providers.default_provider, "anthropic.other");
        assert_eq!(config.get_anthropic_config("other").unwrap().model, "claude-override");
        assert_eq!(config.get_anthropic_config("default").unwrap().model, "claude-test");

        let bad = Config::load_with_overrides(
            Some(path.to_str().unwrap()),
            Some("anthropic.nope".to_string()),
            None,
        );
        assert!(bad.is_err());
    }
}
